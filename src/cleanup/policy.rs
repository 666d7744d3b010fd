use log::debug;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::{
    BYTES_PER_MB, DEFAULT_MAX_AGE_MINUTES, DEFAULT_MAX_FILES, DEFAULT_MAX_SIZE_MB,
};
use crate::types::FileSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub max_age: Duration,
    pub max_file_count: u32,
    pub max_total_size: u64,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_age: Duration::from_secs(DEFAULT_MAX_AGE_MINUTES * 60),
            max_file_count: DEFAULT_MAX_FILES,
            max_total_size: DEFAULT_MAX_SIZE_MB * BYTES_PER_MB,
        }
    }
}

impl RetentionPolicy {
    pub fn from_user_units(max_age_minutes: u64, max_files: u32, max_size_mb: u64) -> Self {
        Self {
            max_age: Duration::from_secs(max_age_minutes.saturating_mul(60)),
            max_file_count: max_files,
            max_total_size: max_size_mb.saturating_mul(BYTES_PER_MB),
        }
    }

    /// 覆盖部分阈值。缺省或为 0 的值沿用当前策略，过大的值按上限处理
    pub fn with_overrides(
        &self,
        max_age_minutes: Option<u64>,
        max_files: Option<u32>,
        max_size_mb: Option<u64>,
    ) -> Self {
        let mut policy = *self;
        if let Some(minutes) = max_age_minutes.filter(|m| *m > 0) {
            policy.max_age = Duration::from_secs(minutes.saturating_mul(60));
        }
        if let Some(files) = max_files.filter(|f| *f > 0) {
            policy.max_file_count = files;
        }
        if let Some(mb) = max_size_mb.filter(|m| *m > 0) {
            policy.max_total_size = mb.saturating_mul(BYTES_PER_MB);
        }
        policy
    }

    pub fn max_age_minutes(&self) -> u64 {
        self.max_age.as_secs() / 60
    }

    pub fn max_size_mb(&self) -> u64 {
        self.max_total_size / BYTES_PER_MB
    }
}

/// 待删除文件的集合，按修改时间从旧到新排列，路径不重复
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeletionPlan {
    pub paths: Vec<PathBuf>,
    /// 生成计划时目录中的文件数
    pub considered: usize,
}

impl DeletionPlan {
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.paths.iter().any(|p| p == path)
    }
}

/// 根据保留策略计算需要删除的文件：超龄、超出数量的最旧文件、
/// 超出总大小时从最旧开始释放到刚好满足预算为止。三者取并集
pub fn plan(snapshots: &[FileSnapshot], policy: &RetentionPolicy) -> DeletionPlan {
    let mut sorted: Vec<&FileSnapshot> = snapshots.iter().collect();
    sorted.sort_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.name.cmp(&b.name)));

    let mut marked = vec![false; sorted.len()];

    let max_age_ms = u64::try_from(policy.max_age.as_millis()).unwrap_or(u64::MAX);
    let mut by_age = 0;
    for (i, snapshot) in sorted.iter().enumerate() {
        if snapshot.age_ms > max_age_ms {
            marked[i] = true;
            by_age += 1;
        }
    }

    let total = sorted.len();
    let max_files = policy.max_file_count as usize;
    let by_count = total.saturating_sub(max_files);
    for flag in marked.iter_mut().take(by_count) {
        *flag = true;
    }

    let total_size: u64 = sorted.iter().map(|s| s.size).sum();
    let mut by_size = 0;
    if total_size > policy.max_total_size {
        let excess = total_size - policy.max_total_size;
        let mut freed = 0u64;
        for (i, snapshot) in sorted.iter().enumerate() {
            if freed >= excess {
                break;
            }
            marked[i] = true;
            freed += snapshot.size;
            by_size += 1;
        }
    }

    debug!(
        "保留策略评估: 共 {} 个文件, 超龄 {}, 超量 {}, 超大小 {}",
        total, by_age, by_count, by_size
    );

    let mut seen = HashSet::new();
    let paths = sorted
        .iter()
        .zip(marked)
        .filter(|(_, flagged)| *flagged)
        .map(|(snapshot, _)| snapshot.path.clone())
        .filter(|path| seen.insert(path.clone()))
        .collect();

    DeletionPlan {
        paths,
        considered: total,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration as ChronoDuration, Utc};

    const MB: u64 = BYTES_PER_MB;

    fn snap(name: &str, size: u64, age_secs: i64, now: DateTime<Utc>) -> FileSnapshot {
        FileSnapshot {
            name: name.to_string(),
            path: PathBuf::from("/scratch").join(name),
            size,
            modified: now - ChronoDuration::seconds(age_secs),
            age_ms: (age_secs * 1000) as u64,
        }
    }

    #[test]
    fn count_rule_removes_exactly_the_oldest_excess() {
        let now = Utc::now();
        // 60 个 1MB 文件，都是 10 分钟左右，越往后越新
        let snapshots: Vec<_> = (0..60)
            .map(|i| snap(&format!("f{:02}.m4a", i), MB, 600 - i, now))
            .collect();

        let plan = plan(&snapshots, &RetentionPolicy::default());

        assert_eq!(plan.len(), 10);
        assert_eq!(plan.considered, 60);
        for i in 0..10 {
            assert!(plan.contains(&PathBuf::from(format!("/scratch/f{:02}.m4a", i))));
        }
        assert!(!plan.contains(&PathBuf::from("/scratch/f10.m4a")));
    }

    #[test]
    fn age_rule_is_strictly_greater_than() {
        let now = Utc::now();
        let policy = RetentionPolicy::default();
        let snapshots = vec![
            snap("exact.m4a", 1, 30 * 60, now),
            snap("older.m4a", 1, 30 * 60 + 1, now),
            snap("young.m4a", 1, 60, now),
        ];
        let plan = plan(&snapshots, &policy);
        assert_eq!(plan.paths, vec![PathBuf::from("/scratch/older.m4a")]);
    }

    #[test]
    fn size_rule_frees_minimum_oldest_first_volume() {
        let now = Utc::now();
        let policy = RetentionPolicy {
            max_age: Duration::from_secs(3600),
            max_file_count: 100,
            max_total_size: 10 * MB,
        };
        // 总计 14MB，超出 4MB：a(3MB) 不够，a+b(6MB) 足够，c/d 保留
        let snapshots = vec![
            snap("d.m4a", 2 * MB, 10, now),
            snap("a.m4a", 3 * MB, 40, now),
            snap("c.m4a", 6 * MB, 20, now),
            snap("b.m4a", 3 * MB, 30, now),
        ];
        let plan = plan(&snapshots, &policy);
        assert_eq!(
            plan.paths,
            vec![PathBuf::from("/scratch/a.m4a"), PathBuf::from("/scratch/b.m4a")]
        );
    }

    #[test]
    fn size_rule_stops_when_excess_is_met_exactly() {
        let now = Utc::now();
        let policy = RetentionPolicy {
            max_age: Duration::from_secs(3600),
            max_file_count: 100,
            max_total_size: 4 * MB,
        };
        let snapshots = vec![
            snap("a.m4a", 2 * MB, 30, now),
            snap("b.m4a", 2 * MB, 20, now),
            snap("c.m4a", 2 * MB, 10, now),
        ];
        let plan = plan(&snapshots, &policy);
        assert_eq!(plan.paths, vec![PathBuf::from("/scratch/a.m4a")]);
    }

    #[test]
    fn overlapping_rules_produce_each_path_once() {
        let now = Utc::now();
        let policy = RetentionPolicy {
            max_age: Duration::from_secs(60),
            max_file_count: 1,
            max_total_size: MB,
        };
        let snapshots = vec![
            snap("a.m4a", MB, 500, now),
            snap("b.m4a", MB, 400, now),
            snap("c.m4a", MB, 5, now),
        ];
        let plan = plan(&snapshots, &policy);
        assert_eq!(
            plan.paths,
            vec![PathBuf::from("/scratch/a.m4a"), PathBuf::from("/scratch/b.m4a")]
        );
    }

    #[test]
    fn duplicate_snapshots_are_deduplicated_by_path() {
        let now = Utc::now();
        let old = snap("a.m4a", 1, 7200, now);
        let plan = plan(&[old.clone(), old], &RetentionPolicy::default());
        assert_eq!(plan.len(), 1);
    }

    #[test]
    fn within_budget_only_age_violators_are_planned() {
        let now = Utc::now();
        let policy = RetentionPolicy::default();
        let mut seed: u64 = 0x2545_f491;
        for _ in 0..50 {
            let snapshots: Vec<_> = (0..20)
                .map(|i| {
                    seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1);
                    let age = (seed >> 33) % 3600;
                    snap(&format!("f{}.m4a", i), MB, age as i64, now)
                })
                .collect();
            let plan = plan(&snapshots, &policy);
            for s in &snapshots {
                let too_old = s.age_ms > policy.max_age.as_millis() as u64;
                assert_eq!(plan.contains(&s.path), too_old, "{:?}", s);
            }
        }
    }

    #[test]
    fn empty_snapshot_yields_empty_plan() {
        let plan = plan(&[], &RetentionPolicy::default());
        assert!(plan.is_empty());
        assert_eq!(plan.considered, 0);
    }

    #[test]
    fn overrides_ignore_missing_and_zero_values() {
        let base = RetentionPolicy::default();
        let policy = base.with_overrides(Some(5), None, Some(0));
        assert_eq!(policy.max_age_minutes(), 5);
        assert_eq!(policy.max_file_count, 50);
        assert_eq!(policy.max_size_mb(), 500);

        let policy = base.with_overrides(None, Some(3), Some(20));
        assert_eq!(policy.max_age_minutes(), 30);
        assert_eq!(policy.max_file_count, 3);
        assert_eq!(policy.max_total_size, 20 * MB);
    }

    #[test]
    fn oversized_overrides_saturate_instead_of_wrapping() {
        let now = Utc::now();
        let snapshots: Vec<_> = (0..3)
            .map(|i| snap(&format!("f{:02}.m4a", i), MB, 600 - i, now))
            .collect();

        let policy = RetentionPolicy::default().with_overrides(Some(u64::MAX), None, Some(1 << 44));
        assert_eq!(policy.max_total_size, u64::MAX);
        assert_eq!(policy.max_age, Duration::from_secs(u64::MAX));
        assert!(plan(&snapshots, &policy).is_empty());

        let policy = RetentionPolicy::from_user_units(u64::MAX, 50, u64::MAX);
        assert_eq!(policy.max_total_size, u64::MAX);
        assert!(plan(&snapshots, &policy).is_empty());
    }

    #[test]
    fn large_age_limit_does_not_truncate_to_a_small_one() {
        let now = Utc::now();
        let snapshots = vec![snap("old.m4a", MB, 86_400, now)];
        // 换算成毫秒后超过 u64，截断只剩 8384 毫秒
        let policy = RetentionPolicy::default().with_overrides(Some(307_445_734_561_826), None, None);
        assert!(plan(&snapshots, &policy).is_empty());
    }
}
