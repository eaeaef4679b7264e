//! 置換表モジュール
//!
//! - `TTEntry` / `TTData`: 16バイトのロックフリーエントリ
//! - `TranspositionTable`: 64バイトクラスターのオープンアドレス表
//!
//! エントリはkey/dataの2ワードをXOR検証付きで読み書きする。書き込みは
//! ワード単位でアトミックなので、他スレッドの書きかけ（torn write）は
//! 検証で弾かれる。世代フィールドで古い探索のエントリから置き換える。

mod entry;
mod table;

pub use entry::{Bound, TTData, TTEntry};
pub use table::{ProbeResult, TranspositionTable};

/// 1クラスターあたりのエントリ数
pub const CLUSTER_SIZE: usize = 4;

/// 世代の増分（下位bitはフラグに使わないため8刻み）
pub const GENERATION_DELTA: u8 = 8;

/// 世代サイクル（relative age計算用）
pub const GENERATION_CYCLE: u16 = 256;
