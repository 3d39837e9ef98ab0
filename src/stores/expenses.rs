//! 経費ストア

use std::sync::Arc;

use log::warn;

use crate::features::expenses::{
    compute_stats, DashboardStats, Expense, ExpenseForm, ExpenseService, ExpenseStatus,
    ExpenseUpdate,
};

/// 経費一覧とダッシュボード統計のクライアントサイドキャッシュ
///
/// ミューテーション成功後はサーバーの返値でキャッシュを楽観的に
/// パッチし、再取得は行わない。
pub struct ExpensesStore {
    service: Arc<ExpenseService>,
    expenses: Vec<Expense>,
    stats: Option<DashboardStats>,
    last_error: Option<String>,
}

impl ExpensesStore {
    pub fn new(service: Arc<ExpenseService>) -> Self {
        Self {
            service,
            expenses: Vec::new(),
            stats: None,
            last_error: None,
        }
    }

    pub fn expenses(&self) -> &[Expense] {
        &self.expenses
    }

    pub fn stats(&self) -> Option<&DashboardStats> {
        self.stats.as_ref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// ユーザーの経費一覧を読み直す
    pub async fn refresh_for_user(&mut self, user_id: &str, limit: Option<usize>) -> bool {
        match self.service.list_for_user(user_id, limit).await {
            Ok(expenses) => {
                self.expenses = expenses;
                self.last_error = None;
                true
            }
            Err(e) => {
                self.last_error = Some(e.user_message());
                false
            }
        }
    }

    /// すべての経費を読み直す（管理者向け）
    pub async fn refresh_all(
        &mut self,
        limit: Option<usize>,
        status: Option<ExpenseStatus>,
    ) -> bool {
        match self.service.list_all(limit, status).await {
            Ok(expenses) => {
                self.expenses = expenses;
                self.last_error = None;
                true
            }
            Err(e) => {
                self.last_error = Some(e.user_message());
                false
            }
        }
    }

    /// 経費を作成し、キャッシュの先頭に追加する
    pub async fn create(&mut self, owner_id: &str, form: ExpenseForm) -> bool {
        match self.service.create(owner_id, form).await {
            Ok(expense) => {
                self.expenses.insert(0, expense);
                self.last_error = None;
                true
            }
            Err(e) => {
                self.last_error = Some(e.user_message());
                false
            }
        }
    }

    /// 経費を部分更新し、キャッシュを結果で差し替える
    pub async fn update(&mut self, expense_id: &str, update: ExpenseUpdate) -> bool {
        match self.service.update(expense_id, update).await {
            Ok(expense) => {
                self.patch(expense);
                self.last_error = None;
                true
            }
            Err(e) => {
                self.last_error = Some(e.user_message());
                false
            }
        }
    }

    /// 経費を承認し、審査者・審査日時をキャッシュに反映する
    pub async fn approve(&mut self, expense_id: &str, reviewer_id: &str) -> bool {
        match self.service.approve(expense_id, reviewer_id).await {
            Ok(expense) => {
                self.patch(expense);
                self.last_error = None;
                true
            }
            Err(e) => {
                self.last_error = Some(e.user_message());
                false
            }
        }
    }

    /// 経費を却下し、理由付きでキャッシュに反映する
    pub async fn reject(&mut self, expense_id: &str, reviewer_id: &str, reason: &str) -> bool {
        match self.service.reject(expense_id, reviewer_id, reason).await {
            Ok(expense) => {
                self.patch(expense);
                self.last_error = None;
                true
            }
            Err(e) => {
                self.last_error = Some(e.user_message());
                false
            }
        }
    }

    /// 経費を削除し、キャッシュからも取り除く
    pub async fn delete(&mut self, expense_id: &str) -> bool {
        match self.service.delete(expense_id).await {
            Ok(()) => {
                self.expenses.retain(|e| e.id != expense_id);
                self.last_error = None;
                true
            }
            Err(e) => {
                self.last_error = Some(e.user_message());
                false
            }
        }
    }

    /// ダッシュボード統計を読み直す
    ///
    /// サービス呼び出しに失敗した場合はローカルキャッシュから再計算する
    /// フォールバックを行う（画面を空にしないための近似値）。
    pub async fn load_stats(&mut self, user_id: Option<&str>) -> bool {
        match self.service.dashboard_stats(user_id).await {
            Ok(stats) => {
                self.stats = Some(stats);
                self.last_error = None;
                true
            }
            Err(e) => {
                warn!("統計の取得に失敗したためローカルから再計算します: {e}");
                self.stats = Some(compute_stats(&self.expenses));
                self.last_error = Some(e.user_message());
                false
            }
        }
    }

    fn patch(&mut self, expense: Expense) {
        if let Some(cached) = self.expenses.iter_mut().find(|e| e.id == expense.id) {
            *cached = expense;
        } else {
            self.expenses.insert(0, expense);
        }
    }
}
