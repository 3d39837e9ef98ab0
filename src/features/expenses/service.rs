//! 経費サービス
//!
//! 経費のライフサイクル（作成 → 審査 → 終端）とダッシュボード集計を扱う。
//! 集計は全件走査のクライアントサイド計算で、経費件数が小さい前提に
//! 依存している。

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use log::{info, warn};
use serde_json::{json, Map, Value};
use uuid::Uuid;

use super::models::{
    CategoryTotal, DashboardStats, Expense, ExpenseForm, ExpenseStatus, ExpenseUpdate,
    MonthlyTotal,
};
use crate::backend::{BackendClient, Query};
use crate::shared::config::BackendConfig;
use crate::shared::errors::{AppError, AppResult};
use crate::shared::utils::month_bucket;

pub struct ExpenseService {
    backend: Arc<dyn BackendClient>,
    config: Arc<BackendConfig>,
}

impl ExpenseService {
    pub fn new(backend: Arc<dyn BackendClient>, config: Arc<BackendConfig>) -> Self {
        Self { backend, config }
    }

    fn collection(&self) -> &str {
        &self.config.collections.expenses
    }

    /// 経費を作成する
    ///
    /// ステータス `pending`、現在日時、月バケット、固定通貨EURを刻印する。
    ///
    /// # 引数
    /// * `owner_id` - 所有ユーザーのID
    /// * `form` - 経費フォーム
    pub async fn create(&self, owner_id: &str, form: ExpenseForm) -> AppResult<Expense> {
        if form.amount <= 0.0 {
            return Err(AppError::invalid_input("金額は正の値で入力してください"));
        }

        let now = Utc::now();
        let mut data = Map::new();
        data.insert("userId".to_string(), Value::String(owner_id.to_string()));
        data.insert(
            "category".to_string(),
            Value::String(form.category.as_str().to_string()),
        );
        data.insert("amount".to_string(), json!(form.amount));
        data.insert(
            "description".to_string(),
            form.description.map(Value::String).unwrap_or(Value::Null),
        );
        data.insert(
            "location".to_string(),
            form.location.map(Value::String).unwrap_or(Value::Null),
        );
        data.insert(
            "placeDetails".to_string(),
            form.place_details.map(Value::String).unwrap_or(Value::Null),
        );
        data.insert("status".to_string(), Value::String("pending".to_string()));
        data.insert("date".to_string(), Value::String(now.to_rfc3339()));
        data.insert("month".to_string(), Value::String(month_bucket(now)));
        data.insert("currency".to_string(), Value::String("EUR".to_string()));

        let document = self
            .backend
            .create_document(self.collection(), &Uuid::new_v4().to_string(), data)
            .await?;
        info!("経費を作成しました: expense_id={}", document.id);
        Ok(document.deserialize()?)
    }

    /// 領収書をアップロードして経費に添付する
    ///
    /// ブロブのアップロードとドキュメント更新の2段階で、トランザクショナル
    /// ではない。更新に失敗した場合はアップロード済みブロブをベスト
    /// エフォートで削除し（補償動作）、元のエラーを伝播する。
    pub async fn upload_receipt(
        &self,
        expense_id: &str,
        file_name: &str,
        mime_type: &str,
        bytes: Vec<u8>,
    ) -> AppResult<Expense> {
        let file = self
            .backend
            .create_file(&Uuid::new_v4().to_string(), file_name, mime_type, bytes)
            .await?;

        let mut data = Map::new();
        data.insert("receiptId".to_string(), Value::String(file.id.clone()));

        match self
            .backend
            .update_document(self.collection(), expense_id, data)
            .await
        {
            Ok(document) => {
                info!(
                    "領収書を添付しました: expense_id={expense_id} file_id={}",
                    file.id
                );
                Ok(document.deserialize()?)
            }
            Err(e) => {
                // 参照されないブロブを残さない
                if let Err(cleanup) = self.backend.delete_file(&file.id).await {
                    warn!(
                        "孤立ブロブの削除に失敗しました: file_id={} error={cleanup}",
                        file.id
                    );
                }
                Err(e.into())
            }
        }
    }

    /// ユーザーの経費一覧を取得する（作成日時の降順）
    pub async fn list_for_user(
        &self,
        user_id: &str,
        limit: Option<usize>,
    ) -> AppResult<Vec<Expense>> {
        let mut queries = vec![
            Query::equal("userId", user_id),
            Query::order_desc("$createdAt"),
        ];
        if let Some(limit) = limit {
            queries.push(Query::limit(limit));
        }

        let list = self
            .backend
            .list_documents(self.collection(), &queries)
            .await?;
        list.documents
            .iter()
            .map(|d| d.deserialize().map_err(AppError::from))
            .collect()
    }

    /// すべての経費を取得する（管理者向け、任意でステータス絞り込み）
    pub async fn list_all(
        &self,
        limit: Option<usize>,
        status: Option<ExpenseStatus>,
    ) -> AppResult<Vec<Expense>> {
        let mut queries = vec![Query::order_desc("$createdAt")];
        if let Some(status) = status {
            queries.push(Query::equal("status", status.as_str()));
        }
        if let Some(limit) = limit {
            queries.push(Query::limit(limit));
        }

        let list = self
            .backend
            .list_documents(self.collection(), &queries)
            .await?;
        list.documents
            .iter()
            .map(|d| d.deserialize().map_err(AppError::from))
            .collect()
    }

    /// 指定月のユーザー経費を取得する
    pub async fn list_for_month(&self, user_id: &str, month: &str) -> AppResult<Vec<Expense>> {
        let queries = [
            Query::equal("userId", user_id),
            Query::equal("month", month),
            Query::order_desc("$createdAt"),
        ];

        let list = self
            .backend
            .list_documents(self.collection(), &queries)
            .await?;
        list.documents
            .iter()
            .map(|d| d.deserialize().map_err(AppError::from))
            .collect()
    }

    /// 経費を1件取得する
    pub async fn get(&self, expense_id: &str) -> AppResult<Expense> {
        let document = self
            .backend
            .get_document(self.collection(), expense_id)
            .await?;
        Ok(document.deserialize()?)
    }

    /// 経費を部分更新する（所有者が編集できるフィールドのみ）
    pub async fn update(&self, expense_id: &str, update: ExpenseUpdate) -> AppResult<Expense> {
        if let Some(amount) = update.amount {
            if amount <= 0.0 {
                return Err(AppError::invalid_input("金額は正の値で入力してください"));
            }
        }

        let document = self
            .backend
            .update_document(self.collection(), expense_id, update.into_data())
            .await?;
        info!("経費を更新しました: expense_id={expense_id}");
        Ok(document.deserialize()?)
    }

    /// 経費を承認する（終端遷移）
    ///
    /// 審査者と審査日時を刻印し、過去の却下理由があれば消去する。
    pub async fn approve(&self, expense_id: &str, reviewer_id: &str) -> AppResult<Expense> {
        let mut data = Map::new();
        data.insert("status".to_string(), Value::String("approved".to_string()));
        data.insert(
            "reviewedBy".to_string(),
            Value::String(reviewer_id.to_string()),
        );
        data.insert(
            "reviewDate".to_string(),
            Value::String(Utc::now().to_rfc3339()),
        );
        data.insert("rejectionReason".to_string(), Value::Null);

        let document = self
            .backend
            .update_document(self.collection(), expense_id, data)
            .await?;
        info!("経費を承認しました: expense_id={expense_id} reviewer={reviewer_id}");
        Ok(document.deserialize()?)
    }

    /// 経費を却下する（終端遷移、理由必須）
    pub async fn reject(
        &self,
        expense_id: &str,
        reviewer_id: &str,
        reason: &str,
    ) -> AppResult<Expense> {
        if reason.trim().is_empty() {
            return Err(AppError::invalid_input("却下理由を入力してください"));
        }

        let mut data = Map::new();
        data.insert("status".to_string(), Value::String("rejected".to_string()));
        data.insert(
            "reviewedBy".to_string(),
            Value::String(reviewer_id.to_string()),
        );
        data.insert(
            "reviewDate".to_string(),
            Value::String(Utc::now().to_rfc3339()),
        );
        data.insert(
            "rejectionReason".to_string(),
            Value::String(reason.to_string()),
        );

        let document = self
            .backend
            .update_document(self.collection(), expense_id, data)
            .await?;
        info!("経費を却下しました: expense_id={expense_id} reviewer={reviewer_id}");
        Ok(document.deserialize()?)
    }

    /// 経費を削除する
    ///
    /// 先に経費を読み取って領収書参照を調べ、ブロブをベストエフォートで
    /// 削除してからドキュメントを消す。この順序を崩すと参照が失われる。
    pub async fn delete(&self, expense_id: &str) -> AppResult<()> {
        let expense = self.get(expense_id).await?;

        if let Some(receipt_id) = &expense.receipt_id {
            if let Err(e) = self.backend.delete_file(receipt_id).await {
                warn!("領収書ブロブを削除できませんでした: file_id={receipt_id} error={e}");
            }
        }

        self.backend
            .delete_document(self.collection(), expense_id)
            .await?;
        info!("経費を削除しました: expense_id={expense_id}");
        Ok(())
    }

    /// ダッシュボード統計を計算する
    ///
    /// # 引数
    /// * `user_id` - 指定するとそのユーザーの経費のみ、`None` で全件
    pub async fn dashboard_stats(&self, user_id: Option<&str>) -> AppResult<DashboardStats> {
        let queries: Vec<Query> = user_id
            .map(|id| vec![Query::equal("userId", id)])
            .unwrap_or_default();

        let list = self
            .backend
            .list_documents(self.collection(), &queries)
            .await?;
        let expenses: Vec<Expense> = list
            .documents
            .iter()
            .map(|d| d.deserialize().map_err(AppError::from))
            .collect::<AppResult<_>>()?;

        Ok(compute_stats(&expenses))
    }
}

/// 経費の集合からダッシュボード統計を計算する
///
/// ストア層のローカルフォールバックからも使うため独立の関数にしている。
/// グループ化は順序付きマップで行い、出力を決定的にする。
pub fn compute_stats(expenses: &[Expense]) -> DashboardStats {
    let mut monthly: BTreeMap<String, (f64, usize)> = BTreeMap::new();
    let mut by_category: BTreeMap<super::models::ExpenseCategory, (f64, usize)> = BTreeMap::new();
    let mut pending = 0;
    let mut approved = 0;
    let mut rejected = 0;
    let mut total_amount = 0.0;

    for expense in expenses {
        match expense.status {
            ExpenseStatus::Pending => pending += 1,
            ExpenseStatus::Approved => approved += 1,
            ExpenseStatus::Rejected => rejected += 1,
        }
        total_amount += expense.amount;

        let month_entry = monthly.entry(expense.month.clone()).or_insert((0.0, 0));
        month_entry.0 += expense.amount;
        month_entry.1 += 1;

        let category_entry = by_category.entry(expense.category).or_insert((0.0, 0));
        category_entry.0 += expense.amount;
        category_entry.1 += 1;
    }

    DashboardStats {
        total_count: expenses.len(),
        pending_count: pending,
        approved_count: approved,
        rejected_count: rejected,
        total_amount,
        monthly: monthly
            .into_iter()
            .map(|(month, (total, count))| MonthlyTotal {
                month,
                total,
                count,
            })
            .collect(),
        by_category: by_category
            .into_iter()
            .map(|(category, (total, count))| CategoryTotal {
                category,
                total,
                count,
            })
            .collect(),
    }
}
