//! ratomic-core: アトミックチェスのエンジンコア
//!
//! アトミックチェスは駒取りのたびに移動先を中心とした爆発が起き、
//! 周囲8マスの非ポーン駒が両軍とも消滅する変則ルール。勝利条件は
//! 相手キングの爆発（詰みではなくキング消滅）である。
//!
//! このクレートは以下を提供する:
//!
//! - `position`: ルールエンジン（合法手判定・爆発・Zobrist・FEN・SEE）
//! - `movegen`: モードマスク付きの指し手生成
//! - `tt`: ロックフリー置換表
//! - `nnue`: 差分更新のNNUE評価
//! - `search`: Alpha-Beta探索とLazy SMP並列化
//!
//! UCIフロントエンドとデータ生成ツールは別クレートの責務。

pub mod bitboard;
pub mod movegen;
pub mod nnue;
pub mod position;
pub mod search;
pub mod tt;
pub mod types;
