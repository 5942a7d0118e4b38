//! # 调用方授权存储
//!
//! 保存当前允许访问的调用方令牌集合。集合是不可变快照，
//! 配置变更时整体替换，读者只会看到完整的旧集合或完整的新集合。

use std::collections::HashSet;
use std::sync::Arc;

use crate::utils::SnapshotCell;

/// 授权令牌快照
pub type AuthorizedTokenSet = HashSet<String>;

/// 调用方授权存储
#[derive(Debug, Default)]
pub struct AuthorizationStore {
    tokens: SnapshotCell<AuthorizedTokenSet>,
}

impl AuthorizationStore {
    /// 创建空存储（拒绝所有调用方）
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// 从令牌列表创建
    pub fn from_tokens<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let store = Self::new();
        store.replace(tokens);
        store
    }

    /// 以新的令牌集合整体替换当前快照
    pub fn replace<I, S>(&self, tokens: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        // 先在锁外构建完整集合，再一次性交换
        let next: AuthorizedTokenSet = tokens.into_iter().map(Into::into).collect();
        self.tokens.store(next);
    }

    /// 令牌是否被授权，空令牌永远不被授权
    pub fn is_authorized(&self, token: &str) -> bool {
        !token.is_empty() && self.tokens.load().contains(token)
    }

    /// 当前快照，便于一次拿到一致的集合做多次查询
    pub fn snapshot(&self) -> Arc<AuthorizedTokenSet> {
        self.tokens.load()
    }

    /// 当前授权令牌数量
    pub fn len(&self) -> usize {
        self.tokens.load().len()
    }

    /// 当前是否没有任何授权令牌
    pub fn is_empty(&self) -> bool {
        self.tokens.load().is_empty()
    }
}
