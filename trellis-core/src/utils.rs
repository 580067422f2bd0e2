//! 工具模块

pub mod creation {
    use parking_lot::Mutex;

    /// 记录当前正在创建的 Bean，用于循环依赖检测和 `is_currently_in_creation`
    #[derive(Debug, Default)]
    pub struct CreationTracker {
        creating: Mutex<Vec<String>>,
    }

    impl CreationTracker {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn is_creating(&self, name: &str) -> bool {
            self.creating.lock().iter().any(|n| n == name)
        }

        /// 标记开始创建，已在创建中时返回 `false`
        pub fn start_creating(&self, name: &str) -> bool {
            let mut creating = self.creating.lock();
            if creating.iter().any(|n| n == name) {
                return false;
            }
            creating.push(name.to_string());
            true
        }

        pub fn finish_creating(&self, name: &str) {
            let mut creating = self.creating.lock();
            if let Some(pos) = creating.iter().rposition(|n| n == name) {
                creating.remove(pos);
            }
        }

        /// 创建链（按开始顺序）
        pub fn current_creating(&self) -> Vec<String> {
            self.creating.lock().clone()
        }

        /// 开始创建并返回在 drop 时清理标记的守卫
        pub fn guard<'a>(&'a self, name: &str) -> Option<CreationGuard<'a>> {
            self.start_creating(name).then(|| CreationGuard {
                tracker: self,
                name: name.to_string(),
            })
        }
    }

    /// 使用 RAII 模式确保在任何情况下都会清理标记
    pub struct CreationGuard<'a> {
        tracker: &'a CreationTracker,
        name: String,
    }

    impl Drop for CreationGuard<'_> {
        fn drop(&mut self) {
            self.tracker.finish_creating(&self.name);
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_creation_tracker() {
            let tracker = CreationTracker::new();

            assert!(!tracker.is_creating("serviceA"));
            assert!(tracker.start_creating("serviceA"));
            assert!(tracker.is_creating("serviceA"));

            // 重复开始意味着循环依赖
            assert!(!tracker.start_creating("serviceA"));

            tracker.finish_creating("serviceA");
            assert!(!tracker.is_creating("serviceA"));
        }

        #[test]
        fn test_guard_clears_on_drop() {
            let tracker = CreationTracker::new();
            {
                let _a = tracker.guard("serviceA").unwrap();
                let _b = tracker.guard("serviceB").unwrap();
                assert_eq!(tracker.current_creating(), vec!["serviceA", "serviceB"]);
                assert!(tracker.guard("serviceA").is_none());
            }
            assert!(tracker.current_creating().is_empty());
        }
    }
}
