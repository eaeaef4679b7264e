//! NNUE評価モジュール
//!
//! 入力特徴は (キングバケット, 駒色, 駒種, マス) のHalfKA系。視点ごとに
//! アキュムレータを持ち、手の適用時はsub/add差分で更新する。キングが
//! バケット境界を跨いだ視点はバケット別キャッシュ（refresh table）との
//! 差分で再構築する。
//!
//! 重みはプログラム起動時に一度だけロードされ、以後は全ワーカーが
//! 読み取り専用で共有する。ロード前の評価はゼロ重みで0を返す。

mod accumulator;
mod features;
mod network;

pub use accumulator::{build_updates, AccumulatorStack, NnueUpdates};
pub use features::{bucket_of, feature_index, refresh_required, BUCKET_COUNT};
pub use network::{evaluate_once, get_network, init_network, Network};

/// 隠れ層の次元
pub const L1_SIZE: usize = 256;

/// 1バケットあたりの入力特徴数（2色 × 6駒種 × 64マス）
pub const INPUT_SIZE: usize = 2 * 6 * 64;

/// 入力特徴の総数
pub const FEATURE_COUNT: usize = BUCKET_COUNT * INPUT_SIZE;

/// 活性化のクランプ上限（量子化スケールA）
pub const QA: i32 = 255;

/// 出力層の量子化スケールB
pub const QB: i32 = 64;

/// 出力のセンチポーン換算スケール
pub const EVAL_SCALE: i32 = 400;
