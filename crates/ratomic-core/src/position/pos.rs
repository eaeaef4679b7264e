//! 局面本体（Position）
//!
//! 手番ごとの駒プレーン・潜在状態（キャスリング権・EP・手数）・Zobristキーを
//! 保持する。`apply` は値渡しの純関数で、新しい局面を返す。
//! 駒の増減は必ず `add_piece` / `remove_piece` を通し、プレーン・`all`・
//! ハッシュが常に整合するよう保つ。
//!
//! アトミックチェス固有の述語（爆発王手・即詰み駒取りなど）もここに置く。
//! 爆発の中心は通常の駒取り・アンパッサンとも移動先マス（`mv.to`）で統一する。

use crate::bitboard::{
    bishop_attacks, blast_mask, king_attacks, knight_attacks, passer_mask, pawn_attacks,
    rook_attacks, Bitboard,
};
use crate::types::{Color, Move, PieceType, Square};

use super::castling::castle_info;
use super::history::SidedKey;
use super::zobrist::{zobrist_psq, ZOBRIST};

/// 片側分の駒配置
///
/// 不変条件: `all` は全プレーンの合併、`hash` は占有マスのZobrist XOR、
/// `pawn_hash` はポーンのみのZobrist XOR。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SidedConfig {
    planes: [Bitboard; PieceType::NUM],
    all: Bitboard,
    hash: u64,
    pawn_hash: u64,
}

impl SidedConfig {
    /// 駒種別のプレーン
    #[inline]
    pub fn plane(&self, pt: PieceType) -> Bitboard {
        self.planes[pt.index()]
    }

    #[inline]
    pub fn pawn(&self) -> Bitboard {
        self.planes[PieceType::Pawn.index()]
    }

    #[inline]
    pub fn knight(&self) -> Bitboard {
        self.planes[PieceType::Knight.index()]
    }

    #[inline]
    pub fn bishop(&self) -> Bitboard {
        self.planes[PieceType::Bishop.index()]
    }

    #[inline]
    pub fn rook(&self) -> Bitboard {
        self.planes[PieceType::Rook.index()]
    }

    #[inline]
    pub fn queen(&self) -> Bitboard {
        self.planes[PieceType::Queen.index()]
    }

    #[inline]
    pub fn king(&self) -> Bitboard {
        self.planes[PieceType::King.index()]
    }

    /// 全駒の合併
    #[inline]
    pub fn all(&self) -> Bitboard {
        self.all
    }

    /// 駒ハッシュ
    #[inline]
    pub fn hash(&self) -> u64 {
        self.hash
    }

    /// ポーンのみのハッシュ
    #[inline]
    pub fn pawn_hash(&self) -> u64 {
        self.pawn_hash
    }

    /// 指定マスの駒種
    pub fn piece_on(&self, sq: Square) -> Option<PieceType> {
        if !self.all.contains(sq) {
            return None;
        }
        PieceType::ALL.into_iter().find(|&pt| self.planes[pt.index()].contains(sq))
    }

    fn add_piece(&mut self, c: Color, pt: PieceType, sq: Square) {
        debug_assert!(!self.all.contains(sq), "add_piece: square occupied");
        self.planes[pt.index()] |= Bitboard::from_square(sq);
        self.all |= Bitboard::from_square(sq);
        self.hash ^= zobrist_psq(c, pt, sq);
        if pt == PieceType::Pawn {
            self.pawn_hash ^= zobrist_psq(c, pt, sq);
        }
    }

    fn remove_piece(&mut self, c: Color, pt: PieceType, sq: Square) {
        debug_assert!(self.planes[pt.index()].contains(sq), "remove_piece: piece missing");
        self.planes[pt.index()] &= !Bitboard::from_square(sq);
        self.all &= !Bitboard::from_square(sq);
        self.hash ^= zobrist_psq(c, pt, sq);
        if pt == PieceType::Pawn {
            self.pawn_hash ^= zobrist_psq(c, pt, sq);
        }
    }
}

/// キャスリング権
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CastleRights {
    pub short: bool,
    pub long: bool,
}

/// 潜在状態（盤上の駒以外の状態）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Latent {
    /// 手番ごとのキャスリング権
    pub castle: [CastleRights; 2],
    /// 手番ごとのEPターゲット（自分が2マス前進した直後のみ1bit立つ）
    pub ep: [Bitboard; 2],
    /// 50手ルール用の半手カウンタ
    pub halfmove_clock: u32,
    /// 通算ply（偶数=白番）
    pub ply_count: u32,
}

/// 局面
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    sides: [SidedConfig; 2],
    pub latent: Latent,
}

impl Position {
    /// 空の局面
    pub fn new() -> Position {
        Position::default()
    }

    /// 手番
    #[inline]
    pub fn side_to_move(&self) -> Color {
        Color::from_index((self.latent.ply_count & 1) as usize)
    }

    /// 指定手番側の配置
    #[inline]
    pub fn us(&self, c: Color) -> &SidedConfig {
        &self.sides[c.index()]
    }

    /// 相手番側の配置
    #[inline]
    pub fn them(&self, c: Color) -> &SidedConfig {
        &self.sides[c.opponent().index()]
    }

    /// 全占有マス
    #[inline]
    pub fn occupied(&self) -> Bitboard {
        self.sides[0].all() | self.sides[1].all()
    }

    /// 指定マスの (手番, 駒種)
    pub fn piece_at(&self, sq: Square) -> Option<(Color, PieceType)> {
        for c in [Color::White, Color::Black] {
            if let Some(pt) = self.sides[c.index()].piece_on(sq) {
                return Some((c, pt));
            }
        }
        None
    }

    /// キングの位置
    #[inline]
    pub fn king_square(&self, c: Color) -> Option<Square> {
        let king = self.us(c).king();
        if king.any() {
            Some(king.first())
        } else {
            None
        }
    }

    /// 駒を追加（プレーンとハッシュを同時更新）
    pub fn add_piece(&mut self, c: Color, pt: PieceType, sq: Square) {
        self.sides[c.index()].add_piece(c, pt, sq);
    }

    /// 駒を削除（プレーンとハッシュを同時更新）
    pub fn remove_piece(&mut self, c: Color, pt: PieceType, sq: Square) {
        self.sides[c.index()].remove_piece(c, pt, sq);
    }

    /// 局面全体のZobristハッシュ（駒 + 潜在状態 + 手番）
    pub fn hash(&self) -> u64 {
        let mut h = self.sides[0].hash() ^ self.sides[1].hash();
        for c in [Color::White, Color::Black] {
            let rights = self.latent.castle[c.index()];
            if rights.short {
                h ^= ZOBRIST.castle[c.index()][0];
            }
            if rights.long {
                h ^= ZOBRIST.castle[c.index()][1];
            }
            let ep = self.latent.ep[c.index()];
            if ep.any() {
                h ^= ZOBRIST.ep_file[c.index()][ep.first().file() as usize];
            }
        }
        if self.side_to_move() == Color::Black {
            h ^= ZOBRIST.side;
        }
        h
    }

    /// ポーンのみのハッシュ
    #[inline]
    pub fn pawn_hash(&self) -> u64 {
        self.sides[0].pawn_hash() ^ self.sides[1].pawn_hash()
    }

    /// 千日手検出用の両視点キー
    #[inline]
    pub fn sided_key(&self) -> SidedKey {
        SidedKey {
            white: self.sides[0].hash(),
            black: self.sides[1].hash(),
        }
    }

    /// 両キングが1枚ずつ存在するか
    pub fn has_both_kings(&self) -> bool {
        self.sides[0].king().count() == 1 && self.sides[1].king().count() == 1
    }

    /// 総駒数
    #[inline]
    pub fn num_pieces(&self) -> usize {
        (self.sides[0].all().count() + self.sides[1].all().count()) as usize
    }

    /// 手番側にポーン・キング以外の駒があるか（NMPの適用条件）
    pub fn has_non_pawn_material(&self) -> bool {
        let us = self.us(self.side_to_move());
        (us.knight() | us.bishop() | us.rook() | us.queen()).any()
    }

    /// 50手ルールの成立
    #[inline]
    pub fn is_rule50_draw(&self) -> bool {
        self.latent.halfmove_clock >= 100
    }

    // =========================================================================
    // 攻撃・王手判定
    // =========================================================================

    /// `target` を攻撃している `attacker` 側の駒の集合
    ///
    /// アトミックではキングは駒を取れないため、キングは攻撃駒に含めない。
    pub fn attackers_to(&self, attacker: Color, target: Square, occ: Bitboard) -> Bitboard {
        let side = self.us(attacker);
        let mut result = pawn_attacks(attacker.opponent(), target) & side.pawn();
        result |= knight_attacks(target) & side.knight();
        let diag = bishop_attacks(target, occ);
        let ortho = rook_attacks(target, occ);
        result |= diag & (side.bishop() | side.queen());
        result |= ortho & (side.rook() | side.queen());
        result
    }

    /// `c` のキングへの古典的な王手駒の集合（キングがいなければ空）
    pub fn checkers(&self, c: Color, occ: Bitboard) -> Bitboard {
        match self.king_square(c) {
            Some(king_sq) => self.attackers_to(c.opponent(), king_sq, occ),
            None => Bitboard::EMPTY,
        }
    }

    /// 両キングが隣接しているか
    pub fn kings_adjacent(&self) -> bool {
        match (self.king_square(Color::White), self.king_square(Color::Black)) {
            (Some(w), Some(b)) => king_attacks(w).contains(b),
            _ => false,
        }
    }

    /// 手番側が王手されているか
    ///
    /// アトミックの王手 = 相手に「自キングを爆発させる駒取り」が存在すること。
    /// 両キングが隣接している場合は王手は成立しない（キングは駒を取れない）。
    pub fn is_check(&self) -> bool {
        self.is_check_for(self.side_to_move())
    }

    /// 指定手番側が王手されているか
    pub fn is_check_for(&self, c: Color) -> bool {
        if self.king_square(c).is_none() {
            return true;
        }
        if self.kings_adjacent() {
            return false;
        }
        self.king_killable_by(c.opponent())
    }

    /// `attacker` に、相手キングを爆発させ自キングが生き残る駒取りが存在するか
    ///
    /// 爆発が防御側キングに届くのは中心が防御側キングの爆発圏内にあるとき
    /// だけなので、圏内の駒（キング自身を含む）への駒取りとEPだけを調べる。
    fn king_killable_by(&self, attacker: Color) -> bool {
        let defender = attacker.opponent();
        let defender_king = match self.king_square(defender) {
            Some(sq) => sq,
            None => return false,
        };
        let zone = blast_mask(defender_king);
        let occ = self.occupied();
        let attacker_king = self.king_square(attacker);

        let survives = |center: Square| match attacker_king {
            Some(k) => !blast_mask(center).contains(k),
            None => true,
        };

        for target in zone & self.us(defender).all() {
            if !survives(target) {
                continue;
            }
            if self.attackers_to(attacker, target, occ).any() {
                return true;
            }
        }

        // アンパッサン: 着地点（=爆発中心）が圏内のときのみキングに届く
        let ep = self.latent.ep[defender.index()];
        if ep.any() {
            let ep_sq = ep.first();
            if zone.contains(ep_sq)
                && survives(ep_sq)
                && (pawn_attacks(defender, ep_sq) & self.us(attacker).pawn()).any()
            {
                return true;
            }
        }

        false
    }

    /// 手番側に、相手キングを爆発させる駒取り（即詰み手）が存在するか
    pub fn has_blast_capture(&self) -> bool {
        self.has_blast_capture_for(self.side_to_move())
    }

    /// 指定手番側に相手キングを爆発させる駒取りが存在するか
    pub fn has_blast_capture_for(&self, c: Color) -> bool {
        let enemy_king = match self.king_square(c.opponent()) {
            Some(sq) => sq,
            None => return false,
        };
        let zone = blast_mask(enemy_king);
        let our_king = self.king_square(c);
        let occ = self.occupied();

        for target in zone & self.them(c).all() {
            if let Some(k) = our_king {
                if blast_mask(target).contains(k) {
                    continue;
                }
            }
            if self.attackers_to(c, target, occ).any() {
                return true;
            }
        }
        false
    }

    /// 間接王手（相手が自キングを爆発させる駒取りを持つ）か
    ///
    /// 逃れる義務はないが、探索が脅威として認識するための述語。
    pub fn in_blast_check(&self) -> bool {
        self.has_blast_capture_for(self.side_to_move().opponent())
    }

    /// 手番側の指し手 `mv` の爆発が相手キングを破壊するか
    ///
    /// 生成済みの合法手に対して呼ぶ前提（自キングの安全は合法性で保証済み）。
    pub fn is_blast_mate(&self, mv: Move) -> bool {
        if !mv.is_capture() {
            return false;
        }
        let their_king = self.them(self.side_to_move()).king();
        (blast_mask(mv.to()) & their_king).any()
    }

    // =========================================================================
    // 脅威
    // =========================================================================

    /// `c` 側が価値の高い相手駒を攻撃しているマスの集合（koivisto方式）
    pub fn threat_mask(&self, c: Color) -> Bitboard {
        let occ = self.occupied();
        let them = self.them(c);
        let us = self.us(c);

        let mut threats = Bitboard::EMPTY;
        let mut vulnerable = them.all();

        vulnerable &= !them.pawn();
        let mut pawn_attacked = Bitboard::EMPTY;
        for sq in us.pawn() {
            pawn_attacked |= pawn_attacks(c, sq);
        }
        threats |= pawn_attacked & vulnerable;

        vulnerable &= !(them.knight() | them.bishop());
        let mut minor_attacked = Bitboard::EMPTY;
        for sq in us.knight() {
            minor_attacked |= knight_attacks(sq);
        }
        for sq in us.bishop() {
            minor_attacked |= bishop_attacks(sq, occ);
        }
        threats |= minor_attacked & vulnerable;

        vulnerable &= !them.rook();
        let mut rook_attacked = Bitboard::EMPTY;
        for sq in us.rook() {
            rook_attacked |= rook_attacks(sq, occ);
        }
        threats |= rook_attacked & vulnerable;

        threats
    }

    /// 相手側から見た脅威マスク
    pub fn them_threat_mask(&self) -> Bitboard {
        self.threat_mask(self.side_to_move().opponent())
    }

    /// 手番側の指し手 `mv` が新たな脅威を作るか
    pub fn creates_threat(&self, mv: Move) -> bool {
        let c = self.side_to_move();
        let occ = self.occupied();
        let them = self.them(c);

        let attacks = |piece: PieceType, sq: Square| match piece {
            PieceType::Pawn => pawn_attacks(c, sq),
            PieceType::Knight => knight_attacks(sq),
            PieceType::Bishop => bishop_attacks(sq, occ),
            PieceType::Rook => rook_attacks(sq, occ),
            _ => Bitboard::EMPTY,
        };

        let new_attacks = attacks(mv.piece(), mv.to()) & !attacks(mv.piece(), mv.from());

        let vulnerable = match mv.piece() {
            PieceType::Pawn => them.all() & !(them.pawn() | them.king()),
            PieceType::Knight | PieceType::Bishop => them.rook() | them.queen(),
            PieceType::Rook => them.queen(),
            _ => Bitboard::EMPTY,
        };

        (new_attacks & vulnerable).any()
    }

    /// 手番側のポーンが誰にも止められない前進（パッサーの押し）か
    pub fn is_passed_push(&self, mv: Move) -> bool {
        let c = self.side_to_move();
        mv.piece() == PieceType::Pawn
            && !mv.is_capture()
            && (self.them(c).pawn() & passer_mask(c, mv.to())).is_empty()
    }

    // =========================================================================
    // 手の適用
    // =========================================================================

    /// ナル手を適用した局面（手番だけが入れ替わる）
    pub fn apply_null(&self) -> Position {
        let mut next = *self;
        next.latent.ep = [Bitboard::EMPTY; 2];
        next.latent.ply_count += 1;
        next.latent.halfmove_clock += 1;
        next
    }

    /// 手を適用した新しい局面を返す（純関数）
    ///
    /// 駒取りの爆発は移動先マスを中心に半径1マスで起き、中心以外のポーンは
    /// 生き残る。キャスリング権はキング・ルークの移動と、初期位置のルークが
    /// 失われた時点で消滅する。
    pub fn apply(&self, mv: Move) -> Position {
        if mv.is_null() {
            return self.apply_null();
        }

        let us = self.side_to_move();
        let mut next = *self;
        next.latent.ep = [Bitboard::EMPTY; 2];

        let info = castle_info(us);
        next.remove_piece(us, mv.piece(), mv.from());

        let placed = mv.promotion().unwrap_or(mv.piece());
        if mv.is_castle_long(us) {
            next.latent.castle[us.index()] = CastleRights::default();
            next.remove_piece(us, PieceType::Rook, info.long_rook);
            next.add_piece(us, PieceType::King, info.after_long_king);
            next.add_piece(us, PieceType::Rook, info.after_long_rook);
        } else if mv.is_castle_short(us) {
            next.latent.castle[us.index()] = CastleRights::default();
            next.remove_piece(us, PieceType::Rook, info.short_rook);
            next.add_piece(us, PieceType::King, info.after_short_king);
            next.add_piece(us, PieceType::Rook, info.after_short_rook);
        } else {
            next.add_piece(us, placed, mv.to());
        }

        if mv.is_double_push() {
            let ep_sq = Square::new(mv.to().file(), (mv.from().rank() + mv.to().rank()) / 2);
            if (self.them(us).pawn() & pawn_attacks(us, ep_sq)).any() {
                next.latent.ep[us.index()] = Bitboard::from_square(ep_sq);
            }
        }

        if mv.from() == info.start_king {
            next.latent.castle[us.index()] = CastleRights::default();
        }
        if mv.from() == info.short_rook {
            next.latent.castle[us.index()].short = false;
        }
        if mv.from() == info.long_rook {
            next.latent.castle[us.index()].long = false;
        }

        if mv.is_capture() {
            let them = us.opponent();
            if mv.is_en_passant() {
                next.remove_piece(them, PieceType::Pawn, mv.ep_square());
            } else {
                next.remove_piece(them, mv.captured(), mv.to());
            }

            // 取った駒自身も爆発で消える
            next.remove_piece(us, placed, mv.to());

            let blast = blast_mask(mv.to());
            for c in [Color::White, Color::Black] {
                for pt in [
                    PieceType::Knight,
                    PieceType::Bishop,
                    PieceType::Rook,
                    PieceType::Queen,
                    PieceType::King,
                ] {
                    for sq in blast & next.sides[c.index()].plane(pt) {
                        next.remove_piece(c, pt, sq);
                    }
                }
            }
        }

        // 初期位置のルークが失われた側のキャスリング権を落とす
        for c in [Color::White, Color::Black] {
            let info = castle_info(c);
            let rooks = next.sides[c.index()].rook();
            if next.latent.castle[c.index()].short && !rooks.contains(info.short_rook) {
                next.latent.castle[c.index()].short = false;
            }
            if next.latent.castle[c.index()].long && !rooks.contains(info.long_rook) {
                next.latent.castle[c.index()].long = false;
            }
        }

        next.latent.ply_count += 1;
        if mv.is_capture() || mv.piece() == PieceType::Pawn {
            next.latent.halfmove_clock = 0;
        } else {
            next.latent.halfmove_clock += 1;
        }

        debug_assert!(next.planes_coherent());
        next
    }

    // =========================================================================
    // 検証
    // =========================================================================

    /// プレーンと `all` / ハッシュの整合性（デバッグ用）
    pub fn planes_coherent(&self) -> bool {
        for c in [Color::White, Color::Black] {
            let side = &self.sides[c.index()];
            let union = PieceType::ALL
                .into_iter()
                .fold(Bitboard::EMPTY, |acc, pt| acc | side.plane(pt));
            if union != side.all() {
                return false;
            }
        }
        (self.sides[0].all() & self.sides[1].all()).is_empty()
    }

    /// 駒ハッシュをゼロから再計算する（テストの照合用）
    pub fn rebuild_sided_hashes(&self) -> (SidedKey, u64) {
        let mut key = SidedKey::default();
        let mut pawn = 0u64;
        for c in [Color::White, Color::Black] {
            let mut h = 0u64;
            for pt in PieceType::ALL {
                for sq in self.sides[c.index()].plane(pt) {
                    h ^= zobrist_psq(c, pt, sq);
                    if pt == PieceType::Pawn {
                        pawn ^= zobrist_psq(c, pt, sq);
                    }
                }
            }
            match c {
                Color::White => key.white = h,
                Color::Black => key.black = h,
            }
        }
        (key, pawn)
    }
}
