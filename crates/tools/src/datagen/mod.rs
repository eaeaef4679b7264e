//! 自己対局データ生成
//!
//! パイプライン: シード局面 → ランダム序盤 → 固定深さ/ノードの探索 →
//! フィルタ → 重複排除 → ゲーム終了時にWDLを刻印 → バイナリ書き出し。

mod dedup;
mod generator;
mod rescore;
mod sample;
mod seeds;
mod writer;

pub use dedup::DedupCache;
pub use generator::{DataGenerator, FilterPreset};
pub use rescore::{load_tablebase, run_rescore, RescoreConfig, RescoreMode};
pub use sample::{read_sample, GameResult, Sample};
pub use seeds::{EpdSeedStream, SeedProvider};
pub use writer::DataWriter;
