//! 認証・プロフィールサービス
//!
//! セッション管理はプラットフォームに委譲し、このサービスは
//! プロフィールドキュメントとの同期だけを担当する。

use std::sync::Arc;

use chrono::Utc;
use log::{debug, info, warn};
use serde_json::{Map, Value};

use super::models::{LoginOutcome, ProfileUpdate, RegisterInput, RegisterOutcome, UserProfile};
use crate::backend::{Account, BackendClient, PlatformError};
use crate::shared::config::BackendConfig;
use crate::shared::errors::{AppError, AppResult};
use crate::shared::utils::{generate_employee_code, is_valid_email};
use uuid::Uuid;

pub struct AuthService {
    backend: Arc<dyn BackendClient>,
    config: Arc<BackendConfig>,
}

impl AuthService {
    pub fn new(backend: Arc<dyn BackendClient>, config: Arc<BackendConfig>) -> Self {
        Self { backend, config }
    }

    /// メールアドレスとパスワードでログインする
    ///
    /// セッション確立後、プロフィールが存在しなければ合成する。
    ///
    /// # 引数
    /// * `email` - メールアドレス
    /// * `password` - パスワード
    ///
    /// # 戻り値
    /// セッションとプロフィール、または認証エラー
    pub async fn login(&self, email: &str, password: &str) -> AppResult<LoginOutcome> {
        let session = self.backend.create_email_session(email, password).await?;
        let profile = self.ensure_profile().await?;
        info!("ログインしました: user_id={}", profile.id);
        Ok(LoginOutcome { session, profile })
    }

    /// 新規ユーザーを登録する
    ///
    /// アカウント作成 → セッション確立 → プロフィール作成の順に進む。
    /// メール重複時は `Conflict` を返す。
    pub async fn register(&self, input: RegisterInput) -> AppResult<RegisterOutcome> {
        if input.name.trim().is_empty() {
            return Err(AppError::invalid_input("名前を入力してください"));
        }
        if !is_valid_email(&input.email) {
            return Err(AppError::invalid_input(
                "メールアドレスの形式が正しくありません",
            ));
        }

        let account = self
            .backend
            .create_account(
                &Uuid::new_v4().to_string(),
                &input.email,
                &input.password,
                &input.name,
            )
            .await?;

        let session = self
            .backend
            .create_email_session(&input.email, &input.password)
            .await?;
        let profile = self.ensure_profile().await?;

        info!("ユーザーを登録しました: user_id={}", account.id);
        Ok(RegisterOutcome {
            account_id: account.id,
            session,
            profile,
        })
    }

    /// プロフィールの存在を保証する（冪等）
    ///
    /// 現在のアカウントに対応するプロフィールを取得し、存在しなければ
    /// 既定値で合成する。同時実行による `Conflict` は再読み込みで解消する。
    pub async fn ensure_profile(&self) -> AppResult<UserProfile> {
        let account = self.backend.current_account().await?;
        let users = &self.config.collections.users;

        match self.backend.get_document(users, &account.id).await {
            Ok(document) => Ok(document.deserialize()?),
            Err(PlatformError::NotFound(_)) => {
                warn!(
                    "プロフィールが存在しないため合成します: user_id={}",
                    account.id
                );
                let data = Self::default_profile_data(&account);

                match self.backend.create_document(users, &account.id, data).await {
                    Ok(document) => Ok(document.deserialize()?),
                    // 別の呼び出しが先に作成した場合は既存のものを使う
                    Err(PlatformError::Conflict(_)) => {
                        let document = self.backend.get_document(users, &account.id).await?;
                        Ok(document.deserialize()?)
                    }
                    Err(e) => Err(e.into()),
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    fn default_profile_data(account: &Account) -> Map<String, Value> {
        let now = Utc::now().to_rfc3339();
        let mut data = Map::new();
        data.insert("name".to_string(), Value::String(account.name.clone()));
        data.insert("email".to_string(), Value::String(account.email.clone()));
        data.insert("role".to_string(), Value::String("employee".to_string()));
        data.insert(
            "employeeCode".to_string(),
            Value::String(generate_employee_code()),
        );
        data.insert("isActive".to_string(), Value::Bool(true));
        data.insert("phone".to_string(), Value::Null);
        data.insert("taxId".to_string(), Value::Null);
        data.insert("avatarUrl".to_string(), Value::Null);
        data.insert("entryDate".to_string(), Value::String(now.clone()));
        data.insert("createdAt".to_string(), Value::String(now.clone()));
        data.insert("updatedAt".to_string(), Value::String(now));
        data
    }

    /// 現在のユーザーのプロフィールを取得する
    ///
    /// セッションがない場合や取得に失敗した場合は `None` に回復する。
    /// 呼び出し側は「未ログイン」と「一時的な失敗」を区別する必要がない。
    pub async fn current_user(&self) -> Option<UserProfile> {
        match self.ensure_profile().await {
            Ok(profile) => Some(profile),
            Err(e) => {
                debug!("現在のユーザーを取得できませんでした: {e}");
                None
            }
        }
    }

    /// プロフィールを部分更新する
    ///
    /// 更新日時を自動的に刻印する。役割と従業員コードはDTOに含まれないため
    /// この経路では変更できない。
    pub async fn update_profile(
        &self,
        user_id: &str,
        update: ProfileUpdate,
    ) -> AppResult<UserProfile> {
        let mut data = update.into_data();
        data.insert(
            "updatedAt".to_string(),
            Value::String(Utc::now().to_rfc3339()),
        );

        let document = self
            .backend
            .update_document(&self.config.collections.users, user_id, data)
            .await?;
        info!("プロフィールを更新しました: user_id={user_id}");
        Ok(document.deserialize()?)
    }

    /// パスワードを変更する
    pub async fn change_password(
        &self,
        new_password: &str,
        current_password: Option<&str>,
    ) -> AppResult<()> {
        self.backend
            .update_password(new_password, current_password)
            .await?;
        info!("パスワードを変更しました");
        Ok(())
    }

    /// パスワード回復メールを送信する
    pub async fn recover_password(&self, email: &str, redirect_url: &str) -> AppResult<()> {
        self.backend.create_recovery(email, redirect_url).await?;
        info!("パスワード回復メールを送信しました");
        Ok(())
    }

    /// パスワード回復を完了する
    pub async fn complete_password_recovery(
        &self,
        account_id: &str,
        secret: &str,
        new_password: &str,
    ) -> AppResult<()> {
        self.backend
            .complete_recovery(account_id, secret, new_password)
            .await?;
        info!("パスワードを再設定しました: user_id={account_id}");
        Ok(())
    }

    /// 現在のセッションからログアウトする
    pub async fn logout(&self) -> AppResult<()> {
        self.backend.delete_current_session().await?;
        info!("ログアウトしました");
        Ok(())
    }

    /// すべてのセッションからログアウトする
    pub async fn logout_all(&self) -> AppResult<()> {
        self.backend.delete_all_sessions().await?;
        info!("すべてのセッションからログアウトしました");
        Ok(())
    }

    /// 認証済みかどうかを返す
    pub async fn is_authenticated(&self) -> bool {
        self.backend.current_account().await.is_ok()
    }
}
