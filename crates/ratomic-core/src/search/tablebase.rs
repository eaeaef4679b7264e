//! 終盤テーブルベースの口
//!
//! 探索はテーブルベースを不透明なWDLオラクルとして扱う。実体（Syzygy系の
//! プローブ実装）は外部の責務で、このクレートはトレイトだけを定義する。

use crate::position::Position;

/// テーブルベースの結果（手番視点）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wdl {
    Loss,
    Draw,
    Win,
}

/// WDLプローブのオラクル
///
/// `probe_wdl` は確定局面でのみ `Some` を返す。探索は駒数が
/// `max_pieces()` 以下の非ルートノードでのみ問い合わせる。
pub trait WdlProbe: Send + Sync + std::fmt::Debug {
    /// 局面のWDLを問い合わせる
    fn probe_wdl(&self, pos: &Position) -> Option<Wdl>;

    /// プローブ可能な最大駒数
    fn max_pieces(&self) -> usize {
        6
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct AlwaysDraw;

    impl WdlProbe for AlwaysDraw {
        fn probe_wdl(&self, _pos: &Position) -> Option<Wdl> {
            Some(Wdl::Draw)
        }
    }

    #[test]
    fn test_probe_trait_object() {
        let probe: Box<dyn WdlProbe> = Box::new(AlwaysDraw);
        let pos = Position::startpos();
        assert_eq!(probe.probe_wdl(&pos), Some(Wdl::Draw));
        assert_eq!(probe.max_pieces(), 6);
    }
}
