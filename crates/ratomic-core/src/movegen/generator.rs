//! 指し手生成器
//!
//! 疑似合法手を列挙し、`is_legal` でアトミック固有のキング安全条件を
//! 適用する。キングによる駒取りは生成しない（取った瞬間に自分も爆発で
//! 消えるため常に非合法）。キャスリングは「キング→ルーク初期位置」の
//! 静かな手として生成する。

use crate::bitboard::{
    bishop_attacks, blast_mask, king_attacks, knight_attacks, pawn_attacks, pawn_pushes,
    queen_attacks, rook_attacks, Bitboard,
};
use crate::position::{castle_info, Position};
use crate::types::{Color, Move, PieceType, Square};

use super::{GenMode, MoveList};

/// 昇格対象の駒種（クイーンが先頭）
const PROMOTIONS: [PieceType; 4] = [
    PieceType::Queen,
    PieceType::Rook,
    PieceType::Bishop,
    PieceType::Knight,
];

/// 合法手を生成する
///
/// `mode` のcheckビットが立っていて手番側が王手（直接・爆発とも）を
/// 受けている場合は、noisy/quietの指定に関わらず全合法手を返す。
pub fn generate_moves(pos: &Position, mode: GenMode) -> MoveList {
    let mut legal = MoveList::new();
    let us = pos.side_to_move();

    if pos.king_square(us).is_none() {
        return legal;
    }

    let mode = effective_mode(pos, mode);
    let pseudo = generate_pseudo(pos, us);

    for mv in pseudo.iter() {
        if is_legal_with_mode(pos, *mv, mode) {
            legal.push(*mv);
        }
    }
    legal
}

/// 指し手の合法性を判定する（全モード）
///
/// 別の局面から持ち込まれた手（置換表の手など）にも安全に使える。
pub fn is_legal(pos: &Position, mv: Move) -> bool {
    is_legal_with_mode(pos, mv, GenMode::ALL)
}

fn effective_mode(pos: &Position, mode: GenMode) -> GenMode {
    if mode.check_escalation() && (pos.is_check() || pos.in_blast_check()) {
        GenMode::ALL
    } else {
        mode
    }
}

fn generate_pseudo(pos: &Position, us: Color) -> MoveList {
    let mut pseudo = MoveList::new();
    let occ = pos.occupied();
    let our = pos.us(us);
    let their = pos.them(us);
    let last_rank: u8 = match us {
        Color::White => 7,
        Color::Black => 0,
    };

    // ポーン
    for from in our.pawn() {
        for to in pawn_pushes(us, from, occ) {
            if to.rank() == last_rank {
                for promo in PROMOTIONS {
                    pseudo.push(Move::quiet(from, to, PieceType::Pawn).with_promotion(promo));
                }
            } else {
                pseudo.push(Move::quiet(from, to, PieceType::Pawn));
            }
        }

        for to in pawn_attacks(us, from) & their.all() {
            let captured = their.piece_on(to).expect("capture target occupied");
            if to.rank() == last_rank {
                for promo in PROMOTIONS {
                    pseudo.push(Move::capture(from, to, PieceType::Pawn, captured).with_promotion(promo));
                }
            } else {
                pseudo.push(Move::capture(from, to, PieceType::Pawn, captured));
            }
        }

        let ep = pos.latent.ep[us.opponent().index()];
        if ep.any() {
            let ep_sq = ep.first();
            if pawn_attacks(us, from).contains(ep_sq) {
                let cap_sq = Square::new(ep_sq.file(), from.rank());
                pseudo.push(Move::en_passant(from, ep_sq, cap_sq));
            }
        }
    }

    // ナイト・ビショップ・ルーク・クイーン
    let sliders: [(PieceType, fn(Square, Bitboard) -> Bitboard); 4] = [
        (PieceType::Knight, |sq, _| knight_attacks(sq)),
        (PieceType::Bishop, bishop_attacks),
        (PieceType::Rook, rook_attacks),
        (PieceType::Queen, queen_attacks),
    ];
    for (pt, attacks) in sliders {
        for from in our.plane(pt) {
            for to in attacks(from, occ) & !our.all() {
                match their.piece_on(to) {
                    Some(captured) => pseudo.push(Move::capture(from, to, pt, captured)),
                    None => pseudo.push(Move::quiet(from, to, pt)),
                }
            }
        }
    }

    // キング（静かな手のみ）
    if let Some(king_sq) = pos.king_square(us) {
        for to in king_attacks(king_sq) & !occ {
            pseudo.push(Move::quiet(king_sq, to, PieceType::King));
        }
    }

    // キャスリング（経路の空きだけ確認し、安全性はis_legalに任せる）
    let info = castle_info(us);
    let rights = pos.latent.castle[us.index()];
    if rights.short && (info.short_mask & occ).is_empty() {
        pseudo.push(Move::quiet(info.start_king, info.short_rook, PieceType::King));
    }
    if rights.long && (info.long_occ_mask & occ).is_empty() {
        pseudo.push(Move::quiet(info.start_king, info.long_rook, PieceType::King));
    }

    pseudo
}

fn is_legal_with_mode(pos: &Position, mv: Move, mode: GenMode) -> bool {
    let us = pos.side_to_move();

    if pos.king_square(us).is_none() || mv.is_null() {
        return false;
    }

    if mv.is_castle(us) {
        return mode.quiet() && is_legal_castle(pos, mv, us);
    }

    let our = pos.us(us);
    let their = pos.them(us);

    if !our.all().contains(mv.from()) || our.all().contains(mv.to()) {
        return false;
    }
    if our.piece_on(mv.from()) != Some(mv.piece()) {
        return false;
    }

    let to_has_enemy = their.all().contains(mv.to());
    if mv.is_capture() != (to_has_enemy || mv.is_en_passant()) {
        return false;
    }
    if mv.is_capture() && !mv.is_en_passant() && their.piece_on(mv.to()) != Some(mv.captured()) {
        return false;
    }

    if mv.is_en_passant() {
        let ep = pos.latent.ep[us.opponent().index()];
        if !ep.contains(mv.to()) {
            return false;
        }
        let cap_sq = Square::new(mv.to().file(), mv.from().rank());
        if mv.ep_square() != cap_sq || !their.pawn().contains(cap_sq) {
            return false;
        }
    }

    let occ = pos.occupied();
    let reachable = match mv.piece() {
        PieceType::Pawn => {
            if mv.is_capture() {
                pawn_attacks(us, mv.from()).contains(mv.to())
            } else {
                pawn_pushes(us, mv.from(), occ).contains(mv.to())
            }
        }
        PieceType::Knight => knight_attacks(mv.from()).contains(mv.to()),
        PieceType::Bishop => bishop_attacks(mv.from(), occ).contains(mv.to()),
        PieceType::Rook => rook_attacks(mv.from(), occ).contains(mv.to()),
        PieceType::Queen => queen_attacks(mv.from(), occ).contains(mv.to()),
        PieceType::King => !mv.is_capture() && king_attacks(mv.from()).contains(mv.to()),
    };
    if !reachable {
        return false;
    }

    let last_rank: u8 = match us {
        Color::White => 7,
        Color::Black => 0,
    };
    match mv.promotion() {
        Some(promo) => {
            if mv.piece() != PieceType::Pawn
                || mv.to().rank() != last_rank
                || promo == PieceType::Pawn
                || promo == PieceType::King
            {
                return false;
            }
        }
        None => {
            if mv.piece() == PieceType::Pawn && mv.to().rank() == last_rank {
                return false;
            }
        }
    }

    // 生成モードのフィルタ
    if mv.is_noisy() {
        if !mode.noisy() {
            return false;
        }
    } else if !mode.quiet() {
        return false;
    }

    // 自キングを巻き込む爆発は、相手キングも死ぬとしても非合法
    if mv.is_capture() {
        if let Some(our_king) = pos.king_square(us) {
            if blast_mask(mv.to()).contains(our_king) {
                return false;
            }
        }
    }

    let next = pos.apply(mv);
    let us_dead = next.us(us).king().is_empty();
    let them_dead = next.them(us).king().is_empty();

    if us_dead && !them_dead {
        return false;
    }
    if !us_dead && !them_dead && !next.kings_adjacent() {
        let occ_after = next.occupied();
        if next.checkers(us, occ_after).any() {
            return false;
        }
    }

    true
}

fn is_legal_castle(pos: &Position, mv: Move, us: Color) -> bool {
    let info = castle_info(us);
    let short = mv.is_castle_short(us);
    let rights = pos.latent.castle[us.index()];

    if mv.is_capture() || mv.is_en_passant() || mv.promotion().is_some() {
        return false;
    }
    if short && !rights.short {
        return false;
    }
    if !short && !rights.long {
        return false;
    }
    if !pos.us(us).king().contains(info.start_king) {
        return false;
    }
    let rook_home = if short { info.short_rook } else { info.long_rook };
    if !pos.us(us).rook().contains(rook_home) {
        return false;
    }

    let occ = pos.occupied();
    let occ_mask = if short { info.short_mask } else { info.long_occ_mask };
    if (occ_mask & occ).any() {
        return false;
    }

    // 王手中のキャスリングと、キングが通るマスへの攻撃は不可
    if pos.checkers(us, occ).any() {
        return false;
    }
    let danger = if short { info.short_mask } else { info.long_danger_mask };
    for sq in danger {
        if pos.attackers_to(us.opponent(), sq, occ).any() {
            return false;
        }
    }

    let next = pos.apply(mv);
    let us_dead = next.us(us).king().is_empty();
    let them_dead = next.them(us).king().is_empty();
    if us_dead && !them_dead {
        return false;
    }
    if !us_dead && !them_dead && !next.kings_adjacent() {
        let occ_after = next.occupied();
        if next.checkers(us, occ_after).any() {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn legal_names(pos: &Position) -> Vec<String> {
        let us = pos.side_to_move();
        generate_moves(pos, GenMode::ALL)
            .iter()
            .map(|mv| mv.name(us))
            .collect()
    }

    #[test]
    fn test_startpos_has_20_moves() {
        // 初手は駒取りが存在しないためオーソドックスチェスと同数
        let pos = Position::startpos();
        assert_eq!(generate_moves(&pos, GenMode::ALL).len(), 20);
        assert_eq!(generate_moves(&pos, GenMode::NOISY).len(), 0);
    }

    #[test]
    fn test_all_generated_moves_are_legal() {
        let pos = Position::startpos();
        for mv in generate_moves(&pos, GenMode::ALL).iter() {
            assert!(is_legal(&pos, *mv), "{} not legal", mv.name(pos.side_to_move()));
        }
    }

    #[test]
    fn test_foreign_move_rejected() {
        let pos = Position::startpos();
        let other = Position::parse_fen("4k3/8/8/8/8/8/8/R3K2R w KQ - 0 1").unwrap();
        for mv in generate_moves(&other, GenMode::ALL).iter() {
            // 別局面由来の手: ルーク・キングの手は初期局面では非合法
            if mv.piece() != PieceType::Pawn {
                assert!(!is_legal(&pos, *mv));
            }
        }
    }

    #[test]
    fn test_king_cannot_capture() {
        // 白キングの隣に黒ポーン: キングによる駒取りは生成されない
        let pos = Position::parse_fen("4k3/8/8/8/8/3p4/3K4/8 w - - 0 1").unwrap();
        let moves = generate_moves(&pos, GenMode::ALL);
        for mv in moves.iter() {
            assert!(!(mv.piece() == PieceType::King && mv.is_capture()));
            assert_ne!(mv.to(), Square::parse("d3").unwrap());
        }
    }

    #[test]
    fn test_adjacent_kings_only_king_moves() {
        let pos = Position::parse_fen("8/8/8/8/3kK3/8/8/8 w - - 0 1").unwrap();
        assert!(!pos.is_check());
        let moves = generate_moves(&pos, GenMode::ALL);
        assert!(!moves.is_empty());
        for mv in moves.iter() {
            assert_eq!(mv.piece(), PieceType::King);
            assert!(!mv.is_capture());
        }
    }

    #[test]
    fn test_cannot_blast_own_king() {
        // d5の黒ポーンを取ると自キング(d4)が爆発圏に入るため非合法
        let pos = Position::parse_fen("4k3/8/8/3p4/3KP3/8/8/8 w - - 0 1").unwrap();
        let names = legal_names(&pos);
        assert!(!names.contains(&"e4d5".to_string()));
    }

    #[test]
    fn test_blast_both_kings_illegal() {
        // 爆発が両キングを巻き込む駒取りも非合法（自キング犠牲は不可）
        let pos = Position::parse_fen("8/8/8/3k4/3p4/3K4/8/3R4 w - - 0 1").unwrap();
        let names = legal_names(&pos);
        assert!(!names.contains(&"d1d4".to_string()));
    }

    #[test]
    fn test_castle_through_attacked_square() {
        // f1が黒ルークに攻撃されていると短キャスリング不可
        let pos = Position::parse_fen("4kr2/8/8/8/8/8/8/4K2R w K - 0 1").unwrap();
        assert!(pos.checkers(Color::White, pos.occupied()).is_empty());
        let names = legal_names(&pos);
        assert!(!names.contains(&"e1g1".to_string()));

        // 攻撃が消えればキャスリング可能
        let pos = Position::parse_fen("4k3/8/8/8/8/8/8/4K2R w K - 0 1").unwrap();
        assert!(legal_names(&pos).contains(&"e1g1".to_string()));
    }

    #[test]
    fn test_castle_path_blocked() {
        let pos = Position::parse_fen("4k3/8/8/8/8/8/8/4KB1R w K - 0 1").unwrap();
        assert!(!legal_names(&pos).contains(&"e1g1".to_string()));
    }

    #[test]
    fn test_en_passant_generated() {
        let pos = Position::parse_fen(
            "rnbqkbnr/ppp1p1pp/p7/3pP3/8/8/PPPP1PPP/RNBQKBNR w KQkq d6 0 3",
        )
        .unwrap();
        let names = legal_names(&pos);
        assert!(names.contains(&"e5d6".to_string()));
    }

    #[test]
    fn test_noisy_mode_filters_quiets() {
        let pos = Position::parse_fen("4k3/8/8/3p4/8/8/3R4/4K3 w - - 0 1").unwrap();
        let noisy = generate_moves(&pos, GenMode::NOISY);
        assert_eq!(noisy.len(), 1);
        assert!(noisy.at(0).is_capture());

        let quiet = generate_moves(&pos, GenMode::QUIET);
        for mv in quiet.iter() {
            assert!(mv.is_quiet());
        }
    }

    #[test]
    fn test_check_escalation_includes_evasions() {
        // 直接王手を受けた局面: NOISY_AND_CHECKでも静かな回避手が出る
        let pos = Position::parse_fen("4k3/8/8/8/8/8/4r3/4K3 w - - 0 1").unwrap();
        assert!(pos.is_check());
        let moves = generate_moves(&pos, GenMode::NOISY_AND_CHECK);
        assert!(!moves.is_empty());
        assert!(moves.iter().any(|mv| mv.is_quiet()));
    }

    #[test]
    fn test_underpromotion_is_quiet() {
        let pos = Position::parse_fen("8/4P3/8/8/8/2k5/8/4K3 w - - 0 1").unwrap();
        let noisy = generate_moves(&pos, GenMode::NOISY);
        assert!(noisy.iter().all(|mv| mv.promotion() == Some(PieceType::Queen)));
        let quiet = generate_moves(&pos, GenMode::QUIET);
        let under: Vec<_> = quiet
            .iter()
            .filter(|mv| mv.promotion().is_some())
            .collect();
        assert_eq!(under.len(), 3);
    }
}
