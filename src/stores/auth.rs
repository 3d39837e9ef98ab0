//! 認証ストア

use std::sync::Arc;

use log::warn;

use crate::features::auth::{AuthService, ProfileUpdate, RegisterInput, UserProfile};

/// 認証状態のクライアントサイドキャッシュ
///
/// 直近のログインユーザーを保持し、失敗時はユーザー向けメッセージを
/// `last_error` に記録する。ミューテーション操作は成否をboolで返す。
pub struct AuthStore {
    service: Arc<AuthService>,
    user: Option<UserProfile>,
    last_error: Option<String>,
}

impl AuthStore {
    pub fn new(service: Arc<AuthService>) -> Self {
        Self {
            service,
            user: None,
            last_error: None,
        }
    }

    pub fn user(&self) -> Option<&UserProfile> {
        self.user.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// ログインしてユーザーをキャッシュする
    pub async fn login(&mut self, email: &str, password: &str) -> bool {
        match self.service.login(email, password).await {
            Ok(outcome) => {
                self.user = Some(outcome.profile);
                self.last_error = None;
                true
            }
            Err(e) => {
                self.last_error = Some(e.user_message());
                false
            }
        }
    }

    /// 新規登録してそのままログイン状態にする
    pub async fn register(&mut self, input: RegisterInput) -> bool {
        match self.service.register(input).await {
            Ok(outcome) => {
                self.user = Some(outcome.profile);
                self.last_error = None;
                true
            }
            Err(e) => {
                self.last_error = Some(e.user_message());
                false
            }
        }
    }

    /// サーバーから現在のユーザーを読み直す
    pub async fn load_current_user(&mut self) {
        self.user = self.service.current_user().await;
    }

    /// プロフィールを更新し、キャッシュを結果で差し替える
    pub async fn update_profile(&mut self, update: ProfileUpdate) -> bool {
        let Some(user_id) = self.user.as_ref().map(|u| u.id.clone()) else {
            self.last_error = Some("ログインしていません".to_string());
            return false;
        };

        match self.service.update_profile(&user_id, update).await {
            Ok(profile) => {
                self.user = Some(profile);
                self.last_error = None;
                true
            }
            Err(e) => {
                self.last_error = Some(e.user_message());
                false
            }
        }
    }

    /// ログアウトする
    ///
    /// サーバー側の失敗に関わらずローカルのユーザーは消す。セッションが
    /// 既に切れている場合でもUIを未ログイン状態に戻すため。
    pub async fn logout(&mut self) -> bool {
        let result = self.service.logout().await;
        self.user = None;

        match result {
            Ok(()) => {
                self.last_error = None;
                true
            }
            Err(e) => {
                warn!("ログアウトに失敗しました: {e}");
                self.last_error = Some(e.user_message());
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::shared::config::BackendConfig;

    fn store() -> AuthStore {
        let backend = Arc::new(MemoryBackend::new());
        let config = Arc::new(BackendConfig::in_memory());
        AuthStore::new(Arc::new(AuthService::new(backend, config)))
    }

    fn input() -> RegisterInput {
        RegisterInput {
            name: "Ana".to_string(),
            email: "ana@example.com".to_string(),
            password: "segredo123".to_string(),
        }
    }

    #[tokio::test]
    async fn test_register_and_login_cache_user() {
        let mut store = store();

        assert!(store.register(input()).await);
        assert!(store.is_authenticated());
        assert!(store.last_error().is_none());

        store.logout().await;
        assert!(!store.is_authenticated());

        assert!(store.login("ana@example.com", "segredo123").await);
        assert_eq!(store.user().unwrap().email, "ana@example.com");
    }

    #[tokio::test]
    async fn test_failed_login_records_user_message() {
        let mut store = store();

        assert!(!store.login("ninguem@example.com", "errada").await);
        assert!(!store.is_authenticated());
        assert!(store.last_error().is_some());
    }

    #[tokio::test]
    async fn test_logout_clears_user_even_on_error() {
        let mut store = store();
        store.register(input()).await;

        // 1回目のログアウトでセッションは消える
        assert!(store.logout().await);

        // セッションなしでのログアウトは失敗するが、ユーザーは消えたまま
        store.load_current_user().await;
        assert!(!store.logout().await);
        assert!(!store.is_authenticated());
    }

    #[tokio::test]
    async fn test_update_profile_patches_cache() {
        let mut store = store();
        store.register(input()).await;

        let updated = store
            .update_profile(ProfileUpdate {
                name: Some("Ana Santos".to_string()),
                ..Default::default()
            })
            .await;
        assert!(updated);
        assert_eq!(store.user().unwrap().name, "Ana Santos");
    }

    #[tokio::test]
    async fn test_update_profile_requires_login() {
        let mut store = store();
        assert!(
            !store
                .update_profile(ProfileUpdate::default())
                .await
        );
        assert!(store.last_error().is_some());
    }
}
