//! 認証・プロフィール機能のデータモデル

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::backend::Session;

/// ユーザーの役割
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// 管理者：全データの閲覧・操作が可能
    Admin,
    /// マネージャー：経費の承認・却下が可能
    Manager,
    /// 一般従業員
    Employee,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Manager => "manager",
            Role::Employee => "employee",
        }
    }
}

/// ユーザープロフィール
///
/// アカウントと1対1で対応し、同じIDを共有する。アカウント作成時に
/// プロフィールが欠けている場合は初回アクセス時に合成される。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
    /// 従業員コード（`EMP-` + 5桁）
    pub employee_code: String,
    pub is_active: bool,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub tax_id: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    pub entry_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// プロフィール更新DTO
///
/// 役割と従業員コードはこの経路では変更できない（フィールド自体を持たない）。
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub tax_id: Option<String>,
    pub avatar_url: Option<String>,
}

impl ProfileUpdate {
    /// 設定されたフィールドのみを書き込み用データに変換する
    pub fn into_data(self) -> Map<String, Value> {
        let mut data = Map::new();
        if let Some(name) = self.name {
            data.insert("name".to_string(), Value::String(name));
        }
        if let Some(phone) = self.phone {
            data.insert("phone".to_string(), Value::String(phone));
        }
        if let Some(tax_id) = self.tax_id {
            data.insert("taxId".to_string(), Value::String(tax_id));
        }
        if let Some(avatar_url) = self.avatar_url {
            data.insert("avatarUrl".to_string(), Value::String(avatar_url));
        }
        data
    }
}

/// 新規登録の入力
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterInput {
    pub name: String,
    pub email: String,
    pub password: String,
}

/// ログイン結果
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub session: Session,
    pub profile: UserProfile,
}

/// 新規登録結果
#[derive(Debug, Clone)]
pub struct RegisterOutcome {
    pub account_id: String,
    pub session: Session,
    pub profile: UserProfile,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_role_wire_values() {
        assert_eq!(serde_json::to_value(Role::Admin).unwrap(), json!("admin"));
        assert_eq!(
            serde_json::to_value(Role::Manager).unwrap(),
            json!("manager")
        );
        assert_eq!(
            serde_json::to_value(Role::Employee).unwrap(),
            json!("employee")
        );
    }

    #[test]
    fn test_profile_update_skips_unset_fields() {
        let update = ProfileUpdate {
            name: Some("山田".to_string()),
            phone: None,
            tax_id: None,
            avatar_url: Some("file-1".to_string()),
        };

        let data = update.into_data();
        assert_eq!(data.len(), 2);
        assert_eq!(data.get("name"), Some(&json!("山田")));
        assert_eq!(data.get("avatarUrl"), Some(&json!("file-1")));
        // 役割と従業員コードはそもそも書き込めない
        assert!(data.get("role").is_none());
        assert!(data.get("employeeCode").is_none());
    }
}
