use serde::Serialize;

/// バッチ操作の集約結果
///
/// バッチは全体としては決して失敗しない。各項目の成否は独立で、
/// 呼び出し側には成功数と総数だけを返す。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatchOutcome {
    /// 成功した項目数
    pub successful: usize,
    /// 処理対象の総数
    pub total: usize,
}

impl BatchOutcome {
    pub fn new(successful: usize, total: usize) -> Self {
        Self { successful, total }
    }

    /// すべての項目が成功したかどうか
    pub fn is_complete(&self) -> bool {
        self.successful == self.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_complete() {
        assert!(BatchOutcome::new(3, 3).is_complete());
        assert!(!BatchOutcome::new(2, 3).is_complete());
        assert!(BatchOutcome::new(0, 0).is_complete());
    }
}
