//! シード局面の供給
//!
//! EPD/FENファイル群をラウンドロビンで読み、EOFで先頭へ巻き戻す。
//! `#` で始まる行と空行はスキップ、`;` 以降（EPDオペコード）は無視する。
//! 解析に失敗した行は黙って読み飛ばす。

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::sync::Mutex;

use ratomic_core::position::Position;

/// シード局面の供給者
pub trait SeedProvider: Send + Sync {
    /// 次のシード局面（供給できなければNone）
    fn next(&self) -> Option<Position>;
}

struct StreamState {
    current_path: usize,
    reader: Option<BufReader<File>>,
}

/// ファイル群をラウンドロビンで回すEPDシードストリーム
pub struct EpdSeedStream {
    paths: Vec<PathBuf>,
    state: Mutex<StreamState>,
}

impl EpdSeedStream {
    /// パス一覧から作成
    pub fn new(paths: Vec<PathBuf>) -> EpdSeedStream {
        EpdSeedStream {
            paths,
            state: Mutex::new(StreamState {
                current_path: 0,
                reader: None,
            }),
        }
    }

    /// 1行をFENとして解釈する
    fn parse_line(line: &str) -> Option<Position> {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            return None;
        }
        let fen = match trimmed.find(';') {
            Some(idx) => trimmed[..idx].trim(),
            None => trimmed,
        };
        if fen.is_empty() {
            return None;
        }
        Position::parse_fen(fen).ok()
    }
}

impl SeedProvider for EpdSeedStream {
    fn next(&self) -> Option<Position> {
        if self.paths.is_empty() {
            return None;
        }
        let mut state = self.state.lock().expect("seed mutex poisoned");

        let start_path = state.current_path;
        let mut wrapped = false;

        loop {
            if state.reader.is_none() {
                // 開けないファイルは飛ばす。全滅したら諦める
                let mut opened = false;
                for _ in 0..self.paths.len() {
                    match File::open(&self.paths[state.current_path]) {
                        Ok(file) => {
                            state.reader = Some(BufReader::new(file));
                            opened = true;
                            break;
                        }
                        Err(_) => {
                            state.current_path = (state.current_path + 1) % self.paths.len();
                        }
                    }
                }
                if !opened {
                    return None;
                }
            }

            let mut line = String::new();
            loop {
                line.clear();
                match state.reader.as_mut().unwrap().read_line(&mut line) {
                    Ok(0) => break, // EOF
                    Ok(_) => {
                        if let Some(pos) = Self::parse_line(&line) {
                            return Some(pos);
                        }
                    }
                    Err(_) => break,
                }
            }

            // EOF: 次のファイルへ（全ファイル空なら一周でやめる）
            state.reader = None;
            state.current_path = (state.current_path + 1) % self.paths.len();
            if state.current_path == start_path {
                if wrapped {
                    return None;
                }
                wrapped = true;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_epd_stream_skips_comments_and_opcodes() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# comment line").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "4k3/8/8/8/8/8/8/4K3 w - - ; bm e1e2 ; id \"test\"").unwrap();
        writeln!(file, "not a fen at all").unwrap();
        writeln!(file, "8/8/8/4k3/8/8/4K3/8 b - - 0 1").unwrap();

        let stream = EpdSeedStream::new(vec![file.path().to_path_buf()]);
        let first = stream.next().unwrap();
        assert_eq!(first.num_pieces(), 2);

        let second = stream.next().unwrap();
        assert_eq!(second.side_to_move(), ratomic_core::types::Color::Black);

        // EOFでループして先頭へ戻る
        let third = stream.next().unwrap();
        assert_eq!(third.fen().split(' ').next(), first.fen().split(' ').next());
    }

    #[test]
    fn test_epd_stream_empty_file_terminates() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let stream = EpdSeedStream::new(vec![file.path().to_path_buf()]);
        assert!(stream.next().is_none());
    }

    #[test]
    fn test_epd_stream_no_paths() {
        let stream = EpdSeedStream::new(Vec::new());
        assert!(stream.next().is_none());
    }
}
