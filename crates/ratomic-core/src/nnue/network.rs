//! ネットワーク本体とグローバル共有
//!
//! 特徴変換層（i16）と視点結合の出力層（i16）のみの小さな構成。
//! 重みファイルのフォーマットとローダは外部の責務で、ここでは
//! 生のリトルエンディアンi16列を読むだけの最小ロードを提供する。

use std::sync::{Arc, OnceLock};

use crate::position::Position;
use crate::types::Color;

use super::accumulator::AccumulatorStack;
use super::{EVAL_SCALE, FEATURE_COUNT, L1_SIZE, QA, QB};

/// NNUEネットワーク（ロード後は読み取り専用）
pub struct Network {
    /// 特徴変換層の重み [FEATURE_COUNT][L1_SIZE]
    pub(super) ft_weights: Vec<i16>,
    /// 特徴変換層のバイアス [L1_SIZE]
    pub(super) ft_bias: Vec<i16>,
    /// 出力層の重み [2][L1_SIZE]（手番側・相手側）
    out_weights: Vec<i16>,
    /// 出力層のバイアス
    out_bias: i32,
}

impl Network {
    /// ゼロ重みのネットワーク（評価値は常に0）
    pub fn zeroed() -> Network {
        Network {
            ft_weights: vec![0; FEATURE_COUNT * L1_SIZE],
            ft_bias: vec![0; L1_SIZE],
            out_weights: vec![0; 2 * L1_SIZE],
            out_bias: 0,
        }
    }

    /// 生のi16列（リトルエンディアン）から読み込む
    ///
    /// 並び: ft_weights, ft_bias, out_weights, out_bias(i32相当の2要素)。
    pub fn from_raw_bytes(bytes: &[u8]) -> Option<Network> {
        let expected = (FEATURE_COUNT * L1_SIZE + L1_SIZE + 2 * L1_SIZE + 2) * 2;
        if bytes.len() != expected {
            return None;
        }

        let mut values = bytes
            .chunks_exact(2)
            .map(|c| i16::from_le_bytes([c[0], c[1]]));
        let mut take = |n: usize| -> Vec<i16> { values.by_ref().take(n).collect() };

        let ft_weights = take(FEATURE_COUNT * L1_SIZE);
        let ft_bias = take(L1_SIZE);
        let out_weights = take(2 * L1_SIZE);
        let bias_words = take(2);
        let out_bias = (bias_words[0] as u16 as i32) | ((bias_words[1] as i32) << 16);

        Some(Network {
            ft_weights,
            ft_bias,
            out_weights,
            out_bias,
        })
    }

    /// 両視点のアキュムレータから評価値（手番視点センチポーン）を計算
    pub fn propagate(&self, us: &[i16], them: &[i16]) -> i32 {
        debug_assert_eq!(us.len(), L1_SIZE);
        debug_assert_eq!(them.len(), L1_SIZE);

        let mut sum: i64 = 0;
        for (i, &v) in us.iter().enumerate() {
            let clipped = (v as i32).clamp(0, QA) as i64;
            sum += clipped * self.out_weights[i] as i64;
        }
        for (i, &v) in them.iter().enumerate() {
            let clipped = (v as i32).clamp(0, QA) as i64;
            sum += clipped * self.out_weights[L1_SIZE + i] as i64;
        }

        let raw = sum as i32 + self.out_bias;
        raw * EVAL_SCALE / (QA * QB)
    }
}

static NETWORK: OnceLock<Arc<Network>> = OnceLock::new();

/// グローバルネットワークを設定する（起動時に一度だけ）
///
/// すでに設定済みの場合は何もしない。
pub fn init_network(net: Network) {
    let _ = NETWORK.set(Arc::new(net));
}

/// グローバルネットワークを取得する
///
/// 未設定ならゼロ重みで初期化する（評価値は常に0になる）。
pub fn get_network() -> Arc<Network> {
    NETWORK
        .get_or_init(|| {
            log::warn!("NNUE network not loaded; falling back to zero weights");
            Arc::new(Network::zeroed())
        })
        .clone()
}

/// ゼロから構築したアキュムレータで評価する（フィルタ・テスト用）
pub fn evaluate_once(pos: &Position, stm: Color) -> i32 {
    let net = get_network();
    let mut stack = AccumulatorStack::new(net);
    stack.reset(pos);
    stack.evaluate(pos, stm)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zeroed_network_evaluates_zero() {
        let net = Network::zeroed();
        let us = vec![13i16; L1_SIZE];
        let them = vec![-5i16; L1_SIZE];
        assert_eq!(net.propagate(&us, &them), 0);
    }

    #[test]
    fn test_from_raw_bytes_size_check() {
        assert!(Network::from_raw_bytes(&[0u8; 16]).is_none());
        let expected = (FEATURE_COUNT * L1_SIZE + L1_SIZE + 2 * L1_SIZE + 2) * 2;
        let net = Network::from_raw_bytes(&vec![0u8; expected]).unwrap();
        assert_eq!(net.ft_bias.len(), L1_SIZE);
    }

    #[test]
    fn test_evaluate_once_on_startpos() {
        // グローバルはゼロ重みフォールバックなので0を返す
        let pos = Position::startpos();
        assert_eq!(evaluate_once(&pos, Color::White), 0);
        assert_eq!(evaluate_once(&pos, Color::Black), 0);
    }
}
