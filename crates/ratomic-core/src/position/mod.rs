//! 局面表現モジュール
//!
//! アトミックチェスの局面を表現し、手の適用と各種判定を行う。
//!
//! - `Position`: 局面本体（手番別プレーン・潜在状態・Zobristキー）
//! - `BoardHistory` / `SidedKey`: 千日手検出用の履歴
//! - `Zobrist`: 乱数テーブル（駒×マス・キャスリング・EP・手番）
//! - FEN形式の解析・出力
//! - SEE（アトミック版の静的交換評価）
//!
//! 駒プレーン・`all`・Zobristキーは `add_piece` / `remove_piece` を通じて
//! のみ更新され、常に互いに整合しているように保つ。`apply` は純関数で、
//! 巻き戻しは呼び出し側が元の値を保持することで行う。

mod castling;
mod fen;
mod history;
mod pos;
mod see;
mod zobrist;

pub use castling::{castle_info, CastleInfo};
pub use fen::{FenError, FEN_STARTPOS};
pub use history::{BoardHistory, SidedKey};
pub use pos::{CastleRights, Latent, Position, SidedConfig};
pub use see::SEE_VALUES;
pub use zobrist::{zobrist_psq, ZOBRIST};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::movegen::{generate_moves, GenMode};
    use crate::types::{Color, Move, Square};

    fn sq(name: &str) -> Square {
        Square::parse(name).unwrap()
    }

    fn play(pos: &Position, name: &str) -> Position {
        let us = pos.side_to_move();
        let mv = generate_moves(pos, GenMode::ALL)
            .iter()
            .copied()
            .find(|mv| mv.name(us) == name)
            .unwrap_or_else(|| panic!("move {name} not found in {}", pos.fen()));
        pos.apply(mv)
    }

    #[test]
    fn test_apply_simple_move() {
        let pos = Position::startpos();
        let next = play(&pos, "e2e4");
        assert_eq!(next.side_to_move(), Color::Black);
        assert_eq!(next.latent.halfmove_clock, 0);
        assert!(next.us(Color::White).pawn().contains(sq("e4")));
        assert!(!next.us(Color::White).pawn().contains(sq("e2")));
        assert!(next.planes_coherent());
    }

    #[test]
    fn test_apply_capture_blast_removes_capturer() {
        // 駒取りでは取った駒・取られた駒の両方が盤から消える
        let pos = Position::parse_fen("4k3/8/8/3p4/8/8/3R4/4K3 w - - 0 1").unwrap();
        let next = play(&pos, "d2d5");
        assert!(next.us(Color::White).rook().is_empty());
        assert!(next.us(Color::Black).pawn().is_empty());
        assert_eq!(next.num_pieces(), 2);
    }

    #[test]
    fn test_apply_blast_spares_pawns() {
        // 爆発圏内のポーンは生き残り、非ポーンは消える
        let pos =
            Position::parse_fen("4k3/8/2pn4/3p4/2PN4/8/8/4K3 w - - 0 1").unwrap();
        let next = play(&pos, "d4d5"); // ナイトでd5ポーンを取る
        // 中心d5: 取った駒(N)と取られたポーンは消滅
        assert!(!next.us(Color::White).knight().contains(sq("d5")));
        assert!(!next.us(Color::Black).pawn().contains(sq("d5")));
        // 圏内のポーン c4, c6 は生存
        assert!(next.us(Color::White).pawn().contains(sq("c4")));
        assert!(next.us(Color::Black).pawn().contains(sq("c6")));
        // 圏内の黒ナイトd6は消滅
        assert!(next.us(Color::Black).knight().is_empty());
    }

    #[test]
    fn test_en_passant_blast_sequence() {
        // e2-e4 a7-a6 e4-e5 d7-d5 e5xd6 e.p. 爆発中心はd6
        let mut pos = Position::startpos();
        for mv in ["e2e4", "a7a6", "e4e5", "d7d5"] {
            pos = play(&pos, mv);
        }
        let ep = pos.latent.ep[Color::Black.index()];
        assert!(ep.contains(sq("d6")));

        let next = play(&pos, "e5d6");
        // 取った白ポーンと取られた黒ポーン(d5)はともに消滅
        assert!(!next.us(Color::White).pawn().contains(sq("d6")));
        assert!(!next.us(Color::Black).pawn().contains(sq("d5")));
        // 爆発圏(d6中心)のポーンは生存: c7, e7
        assert!(next.us(Color::Black).pawn().contains(sq("c7")));
        assert!(next.us(Color::Black).pawn().contains(sq("e7")));
        // 圏内の非ポーン: c8ビショップ, d8クイーン, e8キングは圏外/圏内?
        // d6の圏は c5,d5,e5,c6,e6,c7,d7,e7。c8/d8は含まれない。
        assert!(next.us(Color::Black).bishop().contains(sq("c8")));
        assert!(next.us(Color::Black).queen().contains(sq("d8")));
        assert!(next.has_both_kings());
    }

    #[test]
    fn test_castle_apply() {
        let pos = Position::parse_fen("4k3/8/8/8/8/8/8/R3K2R w KQ - 0 1").unwrap();
        let next = play(&pos, "e1g1");
        assert!(next.us(Color::White).king().contains(sq("g1")));
        assert!(next.us(Color::White).rook().contains(sq("f1")));
        assert!(next.us(Color::White).rook().contains(sq("a1")));
        assert!(!next.latent.castle[Color::White.index()].short);
        assert!(!next.latent.castle[Color::White.index()].long);

        let next = play(&pos, "e1c1");
        assert!(next.us(Color::White).king().contains(sq("c1")));
        assert!(next.us(Color::White).rook().contains(sq("d1")));
        assert!(next.us(Color::White).rook().contains(sq("h1")));
    }

    #[test]
    fn test_blast_revokes_castle_rights() {
        // h8ルークが爆発で消えると黒の短キャスリング権も消える
        let pos =
            Position::parse_fen("r3k2r/6p1/8/8/8/8/8/4K2R w Kkq - 0 1").unwrap();
        let us = pos.side_to_move();
        let mv = generate_moves(&pos, GenMode::ALL)
            .iter()
            .copied()
            .find(|mv| mv.name(us) == "h1h8")
            .expect("h1h8 capture");
        assert!(mv.is_capture());
        let next = pos.apply(mv);
        assert!(!next.latent.castle[Color::Black.index()].short);
        assert!(next.latent.castle[Color::Black.index()].long);
    }

    #[test]
    fn test_rook_move_revokes_right() {
        let pos = Position::parse_fen("4k3/8/8/8/8/8/8/R3K2R w KQ - 0 1").unwrap();
        let next = play(&pos, "a1a2");
        assert!(!next.latent.castle[Color::White.index()].long);
        assert!(next.latent.castle[Color::White.index()].short);
    }

    #[test]
    fn test_ep_mask_set_only_when_capturable() {
        // 取れる敵ポーンがいなければEPマスクは立たない
        let pos = Position::startpos();
        let next = play(&pos, "e2e4");
        assert!(next.latent.ep[Color::White.index()].is_empty());

        // b4の黒ポーンがa3を取れるときだけ立つ
        let pos = Position::parse_fen("4k3/8/8/8/1p6/8/P7/4K3 w - - 0 1").unwrap();
        let next = play(&pos, "a2a4");
        assert!(next.latent.ep[Color::White.index()].contains(sq("a3")));
    }

    #[test]
    fn test_blast_mate_predicates() {
        // 白ルークがd5ポーンを取ると黒キング(e5)が爆発圏に入る
        let pos = Position::parse_fen("8/8/8/3pk3/8/3R4/8/4K3 w - - 0 1").unwrap();
        assert!(pos.has_blast_capture());
        let us = pos.side_to_move();
        let mv = generate_moves(&pos, GenMode::NOISY)
            .iter()
            .copied()
            .find(|mv| mv.name(us) == "d3d5")
            .unwrap();
        assert!(pos.is_blast_mate(mv));

        // 黒から見ると間接王手（爆発王手）を受けている
        assert!(pos.apply(Move::NULL).in_blast_check());
    }

    #[test]
    fn test_is_check_direct() {
        // ルークがキング自体を取れる局面は王手
        let pos = Position::parse_fen("4k3/8/8/8/8/8/4r3/4K3 w - - 0 1").unwrap();
        assert!(pos.is_check());

        // 脅威のない局面は王手ではない
        let quiet = Position::startpos();
        assert!(!quiet.is_check());
        assert!(!quiet.in_blast_check());
    }

    #[test]
    fn test_is_check_via_blast_capture() {
        // 黒ルークが白キング隣のナイト(d2)を取ると爆発で白キング(e1)死亡
        let pos = Position::parse_fen("4k3/8/8/8/8/8/3N3r/4K3 w - - 0 1").unwrap();
        // h2ルークはd2を攻撃 → 爆発圏にe1 → 白は王手されている
        assert!(pos.is_check());
    }

    #[test]
    fn test_halfmove_clock_rules() {
        let pos = Position::parse_fen("4k3/8/8/8/8/8/8/R3K3 w Q - 10 20").unwrap();
        let next = play(&pos, "a1a2");
        assert_eq!(next.latent.halfmove_clock, 11);
        let next = play(&pos, "e1e2");
        assert_eq!(next.latent.halfmove_clock, 11);

        let pos2 = Position::parse_fen("4k3/8/8/8/8/8/4P3/4K3 w - - 30 40").unwrap();
        let next = play(&pos2, "e2e3");
        assert_eq!(next.latent.halfmove_clock, 0);
    }

    #[test]
    fn test_hash_incremental_matches_rebuild() {
        // ランダムプレイアウトで増分ハッシュとゼロから再計算が常に一致する
        use rand::{Rng, SeedableRng};
        let mut rng = rand_chacha::ChaCha12Rng::seed_from_u64(0xA70);

        for game in 0..8 {
            let mut pos = Position::startpos();
            for _ply in 0..60 {
                let moves = generate_moves(&pos, GenMode::ALL);
                if moves.is_empty() || !pos.has_both_kings() {
                    break;
                }
                let mv = moves.at(rng.random_range(0..moves.len()));
                pos = pos.apply(mv);

                let (key, pawn) = pos.rebuild_sided_hashes();
                assert_eq!(key, pos.sided_key(), "game {game}: sided hash diverged");
                assert_eq!(pawn, pos.pawn_hash(), "game {game}: pawn hash diverged");
                assert!(pos.planes_coherent());
            }
        }
    }

    #[test]
    fn test_hash_changes_with_latent_state() {
        let with_rights = Position::parse_fen("4k3/8/8/8/8/8/8/R3K2R w KQ - 0 1").unwrap();
        let without = Position::parse_fen("4k3/8/8/8/8/8/8/R3K2R w - - 0 1").unwrap();
        assert_ne!(with_rights.hash(), without.hash());

        let white_to_move = Position::parse_fen("4k3/8/8/8/8/8/8/4K3 w - - 0 1").unwrap();
        let black_to_move = Position::parse_fen("4k3/8/8/8/8/8/8/4K3 b - - 0 1").unwrap();
        assert_ne!(white_to_move.hash(), black_to_move.hash());
    }

    #[test]
    fn test_apply_is_deterministic() {
        let pos = Position::startpos();
        let a = play(&pos, "g1f3");
        let b = play(&pos, "g1f3");
        assert_eq!(a, b);
        assert_eq!(a.hash(), b.hash());
    }

    #[test]
    fn test_fen_apply_fen_roundtrip_corpus() {
        // (fen, move, 期待fen) の小さなコーパス
        let cases = [
            (
                FEN_STARTPOS,
                "e2e4",
                "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1",
            ),
            (
                "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1",
                "g8f6",
                "rnbqkb1r/pppppppp/5n2/8/4P3/8/PPPP1PPP/RNBQKBNR w KQkq - 1 2",
            ),
            (
                "4k3/8/8/8/8/8/8/R3K2R w KQ - 0 1",
                "e1g1",
                "4k3/8/8/8/8/8/8/R4RK1 b - - 1 1",
            ),
        ];
        for (fen, mv_name, expected) in cases {
            let pos = Position::parse_fen(fen).unwrap();
            let next = play(&pos, mv_name);
            assert_eq!(next.fen(), expected, "after {mv_name} on {fen}");
        }
    }

    #[test]
    fn test_fen_roundtrip_random_corpus() {
        // ランダムプレイアウトで到達した約1000局面すべてでFENが往復する
        use rand::{Rng, SeedableRng};
        let mut rng = rand_chacha::ChaCha12Rng::seed_from_u64(0xFE2);

        let mut visited = 0;
        while visited < 1000 {
            let mut pos = Position::startpos();
            for _ply in 0..80 {
                let reparsed = Position::parse_fen(&pos.fen()).unwrap();
                assert_eq!(reparsed, pos, "FEN roundtrip failed for {}", pos.fen());
                assert_eq!(reparsed.hash(), pos.hash());
                visited += 1;

                let moves = generate_moves(&pos, GenMode::ALL);
                if moves.is_empty() || !pos.has_both_kings() {
                    break;
                }
                pos = pos.apply(moves.at(rng.random_range(0..moves.len())));
            }
        }
    }

    #[test]
    fn test_threat_mask() {
        // 白ポーンd4は黒ナイトe5を脅かす
        let pos = Position::parse_fen("4k3/8/8/4n3/3P4/8/8/4K3 w - - 0 1").unwrap();
        let threats = pos.threat_mask(Color::White);
        assert!(threats.contains(sq("e5")));
    }

    #[test]
    fn test_creates_threat() {
        // Ng1-e2 は黒クイーン(d4)への新たな攻撃を作る
        let pos = Position::parse_fen("4k3/8/8/8/3q4/8/8/4K1N1 w - - 0 1").unwrap();
        let us = pos.side_to_move();
        let moves = generate_moves(&pos, GenMode::ALL);
        let threat = moves.iter().copied().find(|mv| mv.name(us) == "g1e2").unwrap();
        assert!(pos.creates_threat(threat));

        let harmless = moves.iter().copied().find(|mv| mv.name(us) == "g1h3").unwrap();
        assert!(!pos.creates_threat(harmless));
    }

    #[test]
    fn test_passed_push() {
        let pos = Position::parse_fen("4k3/8/8/8/4P3/8/8/4K3 w - - 0 1").unwrap();
        let us = pos.side_to_move();
        let mv = generate_moves(&pos, GenMode::ALL)
            .iter()
            .copied()
            .find(|mv| mv.name(us) == "e4e5")
            .unwrap();
        assert!(pos.is_passed_push(mv));

        let blocked = Position::parse_fen("4k3/4p3/8/8/4P3/8/8/4K3 w - - 0 1").unwrap();
        let mv = generate_moves(&blocked, GenMode::ALL)
            .iter()
            .copied()
            .find(|mv| mv.name(us) == "e4e5")
            .unwrap();
        assert!(!blocked.is_passed_push(mv));
    }
}
