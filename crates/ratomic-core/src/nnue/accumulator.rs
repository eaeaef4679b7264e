//! アキュムレータスタックと差分更新
//!
//! 探索の1plyごとにアキュムレータを1段積む。通常の手はsub/addの差分で
//! 次段を作り、キングがバケットを跨いだ視点だけバケット別キャッシュとの
//! 差分で再構築する。爆発で複数の駒が同時に消えるため、subは最大12個
//! まで持てるようにしてある。

use std::sync::Arc;

use crate::bitboard::Bitboard;
use crate::position::Position;
use crate::types::{Color, PieceType, Square, MAX_PLY};

use super::features::{bucket_of, feature_index, refresh_required, BUCKET_COUNT};
use super::network::Network;
use super::L1_SIZE;

/// subの最大数（from + 爆発圏9マス + EPポーン + 余裕）
const MAX_SUBS: usize = 12;
/// addの最大数（キャスリングの2駒）
const MAX_ADDS: usize = 2;

/// 1視点分のアキュムレータ値
type Lane = [i16; L1_SIZE];

/// 両視点分のアキュムレータ
#[derive(Clone)]
struct Accumulator {
    lanes: [Lane; 2],
}

impl Accumulator {
    fn zeroed() -> Accumulator {
        Accumulator {
            lanes: [[0; L1_SIZE]; 2],
        }
    }
}

/// (色, 駒種, マス) の組
#[derive(Clone, Copy)]
struct PieceSquare {
    color: Color,
    piece: PieceType,
    square: Square,
}

/// 1手分の特徴更新
pub struct NnueUpdates {
    subs: [PieceSquare; MAX_SUBS],
    adds: [PieceSquare; MAX_ADDS],
    sub_count: usize,
    add_count: usize,
    refresh: [bool; 2],
}

impl NnueUpdates {
    fn new() -> NnueUpdates {
        let dummy = PieceSquare {
            color: Color::White,
            piece: PieceType::Pawn,
            square: Square::from_index(0),
        };
        NnueUpdates {
            subs: [dummy; MAX_SUBS],
            adds: [dummy; MAX_ADDS],
            sub_count: 0,
            add_count: 0,
            refresh: [false; 2],
        }
    }

    fn push_sub(&mut self, color: Color, piece: PieceType, square: Square) {
        debug_assert!(self.sub_count < MAX_SUBS);
        self.subs[self.sub_count] = PieceSquare { color, piece, square };
        self.sub_count += 1;
    }

    fn push_add(&mut self, color: Color, piece: PieceType, square: Square) {
        debug_assert!(self.add_count < MAX_ADDS);
        self.adds[self.add_count] = PieceSquare { color, piece, square };
        self.add_count += 1;
    }
}

/// 適用前後の局面から特徴更新を作る
pub fn build_updates(before: &Position, after: &Position) -> NnueUpdates {
    let mut updates = NnueUpdates::new();

    for perspective in [Color::White, Color::Black] {
        let prev_king = before.king_square(perspective);
        let next_king = after.king_square(perspective);
        if let (Some(prev), Some(next)) = (prev_king, next_king) {
            if refresh_required(perspective, prev, next) {
                updates.refresh[perspective.index()] = true;
            }
        }
    }

    for c in [Color::White, Color::Black] {
        for pt in PieceType::ALL {
            let before_plane = before.us(c).plane(pt);
            let after_plane = after.us(c).plane(pt);
            for sq in before_plane & !after_plane {
                updates.push_sub(c, pt, sq);
            }
            for sq in after_plane & !before_plane {
                updates.push_add(c, pt, sq);
            }
        }
    }

    updates
}

/// バケット別キャッシュの1エントリ
#[derive(Clone)]
struct RefreshEntry {
    lane: Lane,
    planes: [[Bitboard; PieceType::NUM]; 2],
}

/// アキュムレータスタック
pub struct AccumulatorStack {
    net: Arc<Network>,
    stack: Vec<Accumulator>,
    curr: usize,
    refresh_table: [[RefreshEntry; BUCKET_COUNT]; 2],
}

impl AccumulatorStack {
    /// 新しいスタックを作成
    pub fn new(net: Arc<Network>) -> AccumulatorStack {
        let bias_lane = {
            let mut lane = [0i16; L1_SIZE];
            lane.copy_from_slice(&net.ft_bias);
            lane
        };
        let entry = RefreshEntry {
            lane: bias_lane,
            planes: [[Bitboard::EMPTY; PieceType::NUM]; 2],
        };
        AccumulatorStack {
            stack: vec![Accumulator::zeroed(); MAX_PLY as usize + 8],
            curr: 0,
            refresh_table: [
                std::array::from_fn(|_| entry.clone()),
                std::array::from_fn(|_| entry.clone()),
            ],
            net,
        }
    }

    /// ルート局面から全リセット
    pub fn reset(&mut self, pos: &Position) {
        debug_assert!(pos.has_both_kings());
        self.curr = 0;

        // バケットキャッシュも初期化し直す
        for perspective in [Color::White, Color::Black] {
            for entry in self.refresh_table[perspective.index()].iter_mut() {
                entry.lane.copy_from_slice(&self.net.ft_bias);
                entry.planes = [[Bitboard::EMPTY; PieceType::NUM]; 2];
            }
        }

        for perspective in [Color::White, Color::Black] {
            self.refresh_perspective(pos, perspective, 0);
        }
    }

    /// 手の適用に対応する差分更新（1段積む）
    pub fn push(&mut self, updates: &NnueUpdates, after: &Position) {
        debug_assert!(self.curr + 1 < self.stack.len());
        let next = self.curr + 1;

        for perspective in [Color::White, Color::Black] {
            if updates.refresh[perspective.index()] {
                self.refresh_perspective(after, perspective, next);
                continue;
            }

            // キングが爆発で消えた局面は評価されない（終端で即返る）ため、
            // 前段の値をそのまま引き継ぐ
            let king = match after.king_square(perspective) {
                Some(king) => king,
                None => {
                    let (prev_slice, next_slice) = self.stack.split_at_mut(next);
                    next_slice[0].lanes[perspective.index()]
                        .copy_from_slice(&prev_slice[self.curr].lanes[perspective.index()]);
                    continue;
                }
            };

            let (prev_slice, next_slice) = self.stack.split_at_mut(next);
            let prev_lane = &prev_slice[self.curr].lanes[perspective.index()];
            let next_lane = &mut next_slice[0].lanes[perspective.index()];
            next_lane.copy_from_slice(prev_lane);

            for entry in &updates.subs[..updates.sub_count] {
                let feature =
                    feature_index(perspective, entry.color, entry.piece, entry.square, king);
                sub_feature(next_lane, &self.net, feature);
            }
            for entry in &updates.adds[..updates.add_count] {
                let feature =
                    feature_index(perspective, entry.color, entry.piece, entry.square, king);
                add_feature(next_lane, &self.net, feature);
            }
        }

        self.curr = next;
    }

    /// 1段戻す
    pub fn pop(&mut self) {
        debug_assert!(self.curr > 0);
        self.curr -= 1;
    }

    /// 現在のアキュムレータで評価（手番視点センチポーン）
    pub fn evaluate(&self, pos: &Position, stm: Color) -> i32 {
        debug_assert!(pos.has_both_kings());
        let acc = &self.stack[self.curr];
        self.net.propagate(
            &acc.lanes[stm.index()],
            &acc.lanes[stm.opponent().index()],
        )
    }

    /// 手番視点の活性化符号ハッシュ（補正Historyのキー素材）
    pub fn sign_hash(&self, stm: Color) -> u64 {
        let lane = &self.stack[self.curr].lanes[stm.index()];
        let mut hash = 0u64;
        for (i, &v) in lane.iter().enumerate() {
            if v > 0 {
                hash ^= SIGN_KEYS[i];
            }
        }
        hash
    }

    /// バケット別キャッシュとの差分で1視点を再構築する
    fn refresh_perspective(&mut self, pos: &Position, perspective: Color, slot: usize) {
        let king = pos
            .king_square(perspective)
            .expect("king alive in evaluated positions");
        let bucket = bucket_of(perspective, king);
        let entry = &mut self.refresh_table[perspective.index()][bucket];

        for c in [Color::White, Color::Black] {
            for pt in PieceType::ALL {
                let prev = entry.planes[c.index()][pt.index()];
                let curr = pos.us(c).plane(pt);

                for sq in curr & !prev {
                    let feature = feature_index(perspective, c, pt, sq, king);
                    add_feature(&mut entry.lane, &self.net, feature);
                }
                for sq in prev & !curr {
                    let feature = feature_index(perspective, c, pt, sq, king);
                    sub_feature(&mut entry.lane, &self.net, feature);
                }
                entry.planes[c.index()][pt.index()] = curr;
            }
        }

        self.stack[slot].lanes[perspective.index()].copy_from_slice(&entry.lane);
    }
}

/// 活性化符号ハッシュ用のキー（SplitMix64で展開）
static SIGN_KEYS: [u64; L1_SIZE] = {
    let mut keys = [0u64; L1_SIZE];
    let mut state = 0x6E_6E_75_65_5F_73_67_6Eu64;
    let mut i = 0;
    while i < L1_SIZE {
        state = state.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = state;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        keys[i] = z ^ (z >> 31);
        i += 1;
    }
    keys
};

#[inline]
fn add_feature(lane: &mut Lane, net: &Network, feature: usize) {
    let weights = &net.ft_weights[feature * L1_SIZE..(feature + 1) * L1_SIZE];
    for (acc, w) in lane.iter_mut().zip(weights) {
        *acc += *w;
    }
}

#[inline]
fn sub_feature(lane: &mut Lane, net: &Network, feature: usize) {
    let weights = &net.ft_weights[feature * L1_SIZE..(feature + 1) * L1_SIZE];
    for (acc, w) in lane.iter_mut().zip(weights) {
        *acc -= *w;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::movegen::{generate_moves, GenMode};

    /// 決定的な疑似乱数で埋めたテスト用ネットワーク
    fn test_network() -> Arc<Network> {
        let mut net = Network::zeroed();
        let mut state = 0x9E37_79B9u64;
        let mut next = || {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            ((state >> 40) as i16) % 64
        };
        for w in net.ft_weights.iter_mut() {
            *w = next();
        }
        for b in net.ft_bias.iter_mut() {
            *b = next();
        }
        Arc::new(net)
    }

    fn play(pos: &Position, name: &str) -> Position {
        let us = pos.side_to_move();
        let mv = generate_moves(pos, GenMode::ALL)
            .iter()
            .copied()
            .find(|mv| mv.name(us) == name)
            .unwrap_or_else(|| panic!("move {name} not found"));
        pos.apply(mv)
    }

    /// 差分更新後のアキュムレータがゼロから再構築した値と一致する
    fn assert_matches_fresh(stack: &AccumulatorStack, pos: &Position, net: &Arc<Network>) {
        let mut fresh = AccumulatorStack::new(net.clone());
        fresh.reset(pos);
        for c in [Color::White, Color::Black] {
            assert_eq!(
                stack.stack[stack.curr].lanes[c.index()],
                fresh.stack[fresh.curr].lanes[c.index()],
                "accumulator diverged for {c:?}"
            );
        }
    }

    #[test]
    fn test_incremental_matches_reset_after_moves() {
        let net = test_network();
        let mut stack = AccumulatorStack::new(net.clone());

        let mut pos = Position::startpos();
        stack.reset(&pos);

        for name in ["e2e4", "d7d5", "e4d5", "d8d5", "b1c3"] {
            let next = play(&pos, name);
            let updates = build_updates(&pos, &next);
            stack.push(&updates, &next);
            pos = next;
            assert_matches_fresh(&stack, &pos, &net);
        }
    }

    #[test]
    fn test_push_pop_restores() {
        let net = test_network();
        let mut stack = AccumulatorStack::new(net.clone());

        let pos = Position::startpos();
        stack.reset(&pos);
        let before = stack.stack[stack.curr].lanes[0];

        let next = play(&pos, "g1f3");
        let updates = build_updates(&pos, &next);
        stack.push(&updates, &next);
        stack.pop();

        assert_eq!(stack.stack[stack.curr].lanes[0], before);
    }

    #[test]
    fn test_king_bucket_refresh() {
        let net = test_network();
        let mut stack = AccumulatorStack::new(net.clone());

        // キングがバケット境界(e1→d2)を跨ぐ
        let pos = Position::parse_fen("4k3/8/8/8/8/8/8/4K3 w - - 0 1").unwrap();
        stack.reset(&pos);

        let next = play(&pos, "e1d2");
        let updates = build_updates(&pos, &next);
        assert!(updates.refresh[Color::White.index()]);
        assert!(!updates.refresh[Color::Black.index()]);

        stack.push(&updates, &next);
        assert_matches_fresh(&stack, &next, &net);
    }

    #[test]
    fn test_blast_capture_updates() {
        // 爆発で複数駒が同時に消えても差分更新が一致する
        let net = test_network();
        let mut stack = AccumulatorStack::new(net.clone());

        let pos =
            Position::parse_fen("4k3/8/2nn4/3p4/8/8/3R4/4K3 w - - 0 1").unwrap();
        stack.reset(&pos);

        let next = play(&pos, "d2d5");
        let updates = build_updates(&pos, &next);
        assert!(updates.sub_count >= 3);
        stack.push(&updates, &next);
        assert_matches_fresh(&stack, &next, &net);
    }
}
