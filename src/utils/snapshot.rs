//! # 快照单元
//!
//! 持有一个可整体替换的不可变值。读者拿到的是 `Arc` 快照，
//! 锁只在克隆或替换指针的瞬间持有，从不跨越 I/O。

use std::sync::{Arc, PoisonError, RwLock};

/// 可原子替换的不可变快照
#[derive(Debug)]
pub struct SnapshotCell<T> {
    current: RwLock<Arc<T>>,
}

impl<T> SnapshotCell<T> {
    /// 以初始值创建
    pub fn new(value: T) -> Self {
        Self {
            current: RwLock::new(Arc::new(value)),
        }
    }

    /// 获取当前快照
    pub fn load(&self) -> Arc<T> {
        // 锁内只有指针，中毒时数据不会处于半写状态
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// 整体替换当前快照，旧值在最后一个持有者释放后销毁
    pub fn store(&self, value: T) {
        let next = Arc::new(value);
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let previous = std::mem::replace(&mut *guard, next);
        drop(guard);
        // 旧快照可能是最后一个引用，在锁外释放
        drop(previous);
    }
}

impl<T: Default> Default for SnapshotCell<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}
