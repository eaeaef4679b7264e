//! 探索のシナリオテスト

mod alpha_beta;
