//! 経費機能のデータモデル

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 経費カテゴリ
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpenseCategory {
    Meal,
    Hotel,
    Fuel,
    Transport,
    Material,
    Other,
}

impl ExpenseCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExpenseCategory::Meal => "meal",
            ExpenseCategory::Hotel => "hotel",
            ExpenseCategory::Fuel => "fuel",
            ExpenseCategory::Transport => "transport",
            ExpenseCategory::Material => "material",
            ExpenseCategory::Other => "other",
        }
    }

    /// 通知文などに使う日本語表記
    pub fn label(&self) -> &'static str {
        match self {
            ExpenseCategory::Meal => "食事",
            ExpenseCategory::Hotel => "宿泊",
            ExpenseCategory::Fuel => "燃料",
            ExpenseCategory::Transport => "交通",
            ExpenseCategory::Material => "資材",
            ExpenseCategory::Other => "その他",
        }
    }
}

/// 経費ステータス
///
/// `Pending` が初期状態で、`Approved` / `Rejected` はいずれも終端。
/// 終端から `Pending` に戻す操作は存在しない。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpenseStatus {
    Pending,
    Approved,
    Rejected,
}

impl ExpenseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExpenseStatus::Pending => "pending",
            ExpenseStatus::Approved => "approved",
            ExpenseStatus::Rejected => "rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ExpenseStatus::Pending)
    }
}

/// 経費レコード
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Expense {
    pub id: String,
    pub user_id: String,
    pub category: ExpenseCategory,
    pub amount: f64,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub place_details: Option<String>,
    /// 領収書ブロブの参照
    #[serde(default)]
    pub receipt_id: Option<String>,
    pub status: ExpenseStatus,
    pub date: DateTime<Utc>,
    /// レポート用の月バケット（YYYY-MM）
    pub month: String,
    pub currency: String,
    #[serde(default)]
    pub reviewed_by: Option<String>,
    #[serde(default)]
    pub review_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 経費の作成フォーム
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseForm {
    pub category: ExpenseCategory,
    pub amount: f64,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub place_details: Option<String>,
}

/// 経費の部分更新DTO（所有者が編集できるフィールドのみ）
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseUpdate {
    pub category: Option<ExpenseCategory>,
    pub amount: Option<f64>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub place_details: Option<String>,
}

impl ExpenseUpdate {
    pub fn into_data(self) -> Map<String, Value> {
        let mut data = Map::new();
        if let Some(category) = self.category {
            data.insert(
                "category".to_string(),
                Value::String(category.as_str().to_string()),
            );
        }
        if let Some(amount) = self.amount {
            data.insert("amount".to_string(), serde_json::json!(amount));
        }
        if let Some(description) = self.description {
            data.insert("description".to_string(), Value::String(description));
        }
        if let Some(location) = self.location {
            data.insert("location".to_string(), Value::String(location));
        }
        if let Some(place_details) = self.place_details {
            data.insert("placeDetails".to_string(), Value::String(place_details));
        }
        data
    }
}

/// 月別の集計
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyTotal {
    pub month: String,
    pub total: f64,
    pub count: usize,
}

/// カテゴリ別の集計
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryTotal {
    pub category: ExpenseCategory,
    pub total: f64,
    pub count: usize,
}

/// ダッシュボード統計
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_count: usize,
    pub pending_count: usize,
    pub approved_count: usize,
    pub rejected_count: usize,
    /// 単純加算（通貨換算なし、EUR固定）
    pub total_amount: f64,
    pub monthly: Vec<MonthlyTotal>,
    pub by_category: Vec<CategoryTotal>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_wire_values_and_terminality() {
        assert_eq!(
            serde_json::to_value(ExpenseStatus::Pending).unwrap(),
            json!("pending")
        );
        assert!(!ExpenseStatus::Pending.is_terminal());
        assert!(ExpenseStatus::Approved.is_terminal());
        assert!(ExpenseStatus::Rejected.is_terminal());
    }

    #[test]
    fn test_category_wire_values() {
        for (category, wire) in [
            (ExpenseCategory::Meal, "meal"),
            (ExpenseCategory::Hotel, "hotel"),
            (ExpenseCategory::Fuel, "fuel"),
            (ExpenseCategory::Transport, "transport"),
            (ExpenseCategory::Material, "material"),
            (ExpenseCategory::Other, "other"),
        ] {
            assert_eq!(serde_json::to_value(category).unwrap(), json!(wire));
            assert_eq!(category.as_str(), wire);
        }
    }

    #[test]
    fn test_update_dto_skips_unset_fields() {
        let update = ExpenseUpdate {
            amount: Some(12.5),
            description: Some("昼食".to_string()),
            ..Default::default()
        };

        let data = update.into_data();
        assert_eq!(data.len(), 2);
        assert_eq!(data.get("amount"), Some(&json!(12.5)));
        // ステータスや審査フィールドはこの経路では書き込めない
        assert!(data.get("status").is_none());
    }
}
