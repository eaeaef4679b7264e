//! FEN形式の解析・出力
//!
//! 標準FENに加え、フィールドが4〜5個しかない緩い形式も受け付ける
//! （EPDシードの本文など）。アトミックチェスでは両キングが隣接した
//! 開始局面も合法として受理する。手番側のEPターゲットは相手側の
//! 潜在状態に格納される。

use crate::bitboard::Bitboard;
use crate::types::{Color, PieceType, Square};

use super::pos::Position;

/// 平手初期局面のFEN
pub const FEN_STARTPOS: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

/// FEN解析エラー
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FenError {
    /// フィールド数が足りない
    MissingFields,
    /// 盤面部の形式不正
    InvalidBoard,
    /// 手番フィールドの形式不正
    InvalidSideToMove,
    /// EPフィールドの形式不正
    InvalidEpSquare,
    /// 数値フィールドの形式不正
    InvalidCounter,
}

impl std::fmt::Display for FenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let msg = match self {
            FenError::MissingFields => "missing fields",
            FenError::InvalidBoard => "invalid board field",
            FenError::InvalidSideToMove => "invalid side-to-move field",
            FenError::InvalidEpSquare => "invalid en-passant field",
            FenError::InvalidCounter => "invalid counter field",
        };
        write!(f, "{msg}")
    }
}

impl std::error::Error for FenError {}

impl Position {
    /// 平手初期局面
    pub fn startpos() -> Position {
        Position::parse_fen(FEN_STARTPOS).expect("startpos FEN is valid")
    }

    /// FEN文字列を解析する
    ///
    /// 半手カウンタと手数は省略可能（それぞれ0と1を補う）。
    pub fn parse_fen(fen: &str) -> Result<Position, FenError> {
        let mut fields = fen.split_whitespace();
        let board = fields.next().ok_or(FenError::MissingFields)?;
        let side = fields.next().ok_or(FenError::MissingFields)?;
        let castle = fields.next().ok_or(FenError::MissingFields)?;
        let ep = fields.next().ok_or(FenError::MissingFields)?;
        let halfmove = fields.next().unwrap_or("0");
        let fullmove = fields.next().unwrap_or("1");

        let mut pos = Position::new();

        let mut rank = 7i8;
        let mut file = 0i8;
        for c in board.chars() {
            match c {
                '/' => {
                    if file != 8 || rank == 0 {
                        return Err(FenError::InvalidBoard);
                    }
                    rank -= 1;
                    file = 0;
                }
                '1'..='8' => {
                    file += c as i8 - b'0' as i8;
                }
                _ => {
                    let (color, pt) = PieceType::parse(c).ok_or(FenError::InvalidBoard)?;
                    if file >= 8 {
                        return Err(FenError::InvalidBoard);
                    }
                    pos.add_piece(color, pt, Square::new(file as u8, rank as u8));
                    file += 1;
                }
            }
        }
        if rank != 0 || file != 8 {
            return Err(FenError::InvalidBoard);
        }

        let stm = match side {
            "w" => Color::White,
            "b" => Color::Black,
            _ => return Err(FenError::InvalidSideToMove),
        };

        pos.latent.castle[Color::White.index()].short = castle.contains('K');
        pos.latent.castle[Color::White.index()].long = castle.contains('Q');
        pos.latent.castle[Color::Black.index()].short = castle.contains('k');
        pos.latent.castle[Color::Black.index()].long = castle.contains('q');

        if ep != "-" {
            let sq = Square::parse(ep).ok_or(FenError::InvalidEpSquare)?;
            // 手番側が取れるEPターゲットは、直前に2マス前進した相手側に載る
            pos.latent.ep[stm.opponent().index()] = Bitboard::from_square(sq);
        }

        let halfmove: u32 = halfmove.parse().map_err(|_| FenError::InvalidCounter)?;
        let fullmove: u32 = fullmove.parse().map_err(|_| FenError::InvalidCounter)?;
        let fullmove = fullmove.max(1);

        pos.latent.halfmove_clock = halfmove;
        pos.latent.ply_count = 2 * (fullmove - 1) + (stm == Color::Black) as u32;

        Ok(pos)
    }

    /// FEN文字列を出力する
    pub fn fen(&self) -> String {
        let mut fen = String::with_capacity(80);

        for rank in (0..8).rev() {
            let mut empty = 0;
            for file in 0..8 {
                let sq = Square::new(file, rank);
                match self.piece_at(sq) {
                    Some((c, pt)) => {
                        if empty > 0 {
                            fen.push((b'0' + empty) as char);
                            empty = 0;
                        }
                        fen.push(pt.to_char(c));
                    }
                    None => empty += 1,
                }
            }
            if empty > 0 {
                fen.push((b'0' + empty) as char);
            }
            if rank != 0 {
                fen.push('/');
            }
        }

        let stm = self.side_to_move();
        fen.push(' ');
        fen.push(match stm {
            Color::White => 'w',
            Color::Black => 'b',
        });

        fen.push(' ');
        let mut any_right = false;
        for (flag, c) in [
            (self.latent.castle[Color::White.index()].short, 'K'),
            (self.latent.castle[Color::White.index()].long, 'Q'),
            (self.latent.castle[Color::Black.index()].short, 'k'),
            (self.latent.castle[Color::Black.index()].long, 'q'),
        ] {
            if flag {
                fen.push(c);
                any_right = true;
            }
        }
        if !any_right {
            fen.push('-');
        }

        fen.push(' ');
        let ep = self.latent.ep[stm.opponent().index()];
        if ep.any() {
            fen.push_str(&ep.first().to_string());
        } else {
            fen.push('-');
        }

        fen.push_str(&format!(
            " {} {}",
            self.latent.halfmove_clock,
            1 + self.latent.ply_count / 2
        ));
        fen
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fen_startpos_roundtrip() {
        let pos = Position::startpos();
        assert_eq!(pos.fen(), FEN_STARTPOS);
        assert_eq!(pos.side_to_move(), Color::White);
        assert_eq!(pos.num_pieces(), 32);
        assert!(pos.has_both_kings());
    }

    #[test]
    fn test_fen_adjacent_kings_allowed() {
        // アトミックでは隣接キングの局面も受理される
        let pos = Position::parse_fen("8/8/8/8/3kK3/8/8/8 w - - 0 1").unwrap();
        assert!(pos.kings_adjacent());
        assert!(!pos.is_check());
        assert_eq!(pos.fen(), "8/8/8/8/3kK3/8/8/8 w - - 0 1");
    }

    #[test]
    fn test_fen_ep_field() {
        let pos =
            Position::parse_fen("rnbqkbnr/ppp1pppp/8/3p4/4P3/8/PPPP1PPP/RNBQKBNR w KQkq d6 0 2")
                .unwrap();
        // 白番が取れるEPターゲットは黒側の潜在状態に載る
        let ep = pos.latent.ep[Color::Black.index()];
        assert!(ep.contains(Square::parse("d6").unwrap()));
        assert!(pos.fen().contains(" d6 "));
    }

    #[test]
    fn test_fen_relaxed_fields() {
        // 4フィールドのEPD風FENも受理し、カウンタを補完する
        let pos = Position::parse_fen("8/8/8/4k3/8/8/4K3/7R w - -").unwrap();
        assert_eq!(pos.latent.halfmove_clock, 0);
        assert_eq!(pos.latent.ply_count, 0);
    }

    #[test]
    fn test_fen_black_to_move_ply_parity() {
        let pos = Position::parse_fen("8/8/8/4k3/8/8/4K3/7R b - - 3 10").unwrap();
        assert_eq!(pos.side_to_move(), Color::Black);
        assert_eq!(pos.latent.ply_count, 19);
        assert_eq!(pos.fen(), "8/8/8/4k3/8/8/4K3/7R b - - 3 10");
    }

    #[test]
    fn test_fen_invalid() {
        assert!(Position::parse_fen("").is_err());
        assert!(Position::parse_fen("8/8/8/8 w - -").is_err());
        assert!(Position::parse_fen("9/8/8/8/8/8/8/8 w - -").is_err());
        assert!(Position::parse_fen("8/8/8/8/8/8/8/8 x - -").is_err());
        assert!(Position::parse_fen("8/8/8/8/8/8/8/8 w - z9").is_err());
    }
}
