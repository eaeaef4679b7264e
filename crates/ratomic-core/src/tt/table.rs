//! TranspositionTable本体
//!
//! - Cluster: 16バイトエントリ×4 = 64バイト（キャッシュライン1本）
//! - probe: クラスター内のキー一致検索と置き換え候補の選定
//! - prefetch: 手を適用する前にクラスターを先読みするヒント

use std::sync::atomic::{AtomicU8, Ordering};

use crate::types::{Depth, Move, Value};

use super::entry::{Bound, TTData, TTEntry};
use super::{CLUSTER_SIZE, GENERATION_DELTA};

/// クラスター構造
#[repr(C, align(64))]
struct Cluster {
    entries: [TTEntry; CLUSTER_SIZE],
}

impl Cluster {
    const fn new() -> Self {
        Self {
            entries: [TTEntry::new(), TTEntry::new(), TTEntry::new(), TTEntry::new()],
        }
    }
}

// クラスターは64バイトであることを保証（キャッシュラインサイズ）
const _: () = assert!(std::mem::size_of::<Cluster>() == 64);

/// 置換表
pub struct TranspositionTable {
    table: Vec<Cluster>,
    cluster_count: usize,
    /// 世代カウンター（8刻みで進む）
    generation8: AtomicU8,
}

impl TranspositionTable {
    /// 新しい置換表を作成（サイズはMB単位）
    pub fn new(mb_size: usize) -> Self {
        let cluster_count = (mb_size * 1024 * 1024 / std::mem::size_of::<Cluster>()).max(1);
        let mut table = Vec::with_capacity(cluster_count);
        table.resize_with(cluster_count, Cluster::new);

        Self {
            table,
            cluster_count,
            generation8: AtomicU8::new(0),
        }
    }

    /// 全エントリをクリア
    pub fn clear(&self) {
        self.generation8.store(0, Ordering::Relaxed);
        for cluster in &self.table {
            for entry in &cluster.entries {
                entry.clear();
            }
        }
    }

    /// 新しい探索を開始（世代を進める）
    pub fn new_search(&self) {
        self.generation8.fetch_add(GENERATION_DELTA, Ordering::Relaxed);
    }

    /// 現在の世代を取得
    #[inline]
    pub fn generation(&self) -> u8 {
        self.generation8.load(Ordering::Relaxed)
    }

    /// 置換表を検索する
    ///
    /// ヒットしなかった場合は、世代の古さと深さの浅さで選んだ
    /// 置き換え候補エントリを返す。
    pub fn probe(&self, hash: u64) -> ProbeResult<'_> {
        let cluster = self.cluster_for(hash);
        let gen8 = self.generation();

        for entry in &cluster.entries {
            if let Some(data) = entry.read(hash) {
                return ProbeResult {
                    found: true,
                    data,
                    entry,
                    generation: gen8,
                };
            }
        }

        // 置き換え価値 = depth - relative_age が最小のエントリを選ぶ
        let mut replace = &cluster.entries[0];
        let mut min_value = i32::MAX;
        for entry in &cluster.entries {
            if !entry.is_occupied() {
                replace = entry;
                break;
            }
            let value = entry.stored_depth() - entry.relative_age(gen8);
            if value < min_value {
                min_value = value;
                replace = entry;
            }
        }

        ProbeResult {
            found: false,
            data: TTData::EMPTY,
            entry: replace,
            generation: gen8,
        }
    }

    /// 指定ハッシュのクラスターをプリフェッチ
    #[inline]
    pub fn prefetch(&self, hash: u64) {
        let cluster = self.cluster_for(hash);

        #[cfg(target_arch = "x86_64")]
        unsafe {
            use std::arch::x86_64::_mm_prefetch;
            _mm_prefetch(cluster as *const _ as *const i8, 3); // _MM_HINT_T0
        }

        #[cfg(not(target_arch = "x86_64"))]
        let _ = cluster;
    }

    #[inline]
    fn cluster_for(&self, hash: u64) -> &Cluster {
        let index = ((hash as u128 * self.cluster_count as u128) >> 64) as usize;
        &self.table[index]
    }
}

/// probe結果
pub struct ProbeResult<'a> {
    /// ヒットしたか
    pub found: bool,
    /// 読み取ったデータ
    pub data: TTData,
    entry: &'a TTEntry,
    generation: u8,
}

impl ProbeResult<'_> {
    /// エントリに書き込む（現在の世代を付与）
    pub fn write(&self, hash: u64, value: Value, bound: Bound, depth: Depth, mv: Move, is_pv: bool) {
        self.entry.save(
            hash,
            TTData {
                mv,
                value,
                depth,
                bound,
                is_pv,
                generation: self.generation,
            },
        );
    }
}
