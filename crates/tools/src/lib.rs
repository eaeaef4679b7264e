//! ratomic用のデータ生成ツール群
//!
//! 自己対局による教師データ生成（`datagen gen`）と、既存データの
//! 再スコアリング（`datagen rescore`）を提供する。

pub mod datagen;
