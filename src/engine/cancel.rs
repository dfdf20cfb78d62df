// ==========================================
// 排班表导入暂存系统 - 取消标记
// ==========================================
// 用途: 请求边界超时后通知长耗时操作在下一个安全点停止
// ==========================================

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_is_shared_between_clones() {
        let flag = CancelFlag::new();
        let worker_view = flag.clone();
        assert!(!worker_view.is_cancelled());

        flag.cancel();

        assert!(worker_view.is_cancelled());
    }
}
