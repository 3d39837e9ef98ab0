use chrono::{DateTime, Datelike, Utc};
use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;

/// メールアドレスの簡易形式チェック用パターン
static EMAIL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("メール検証パターンが不正"));

/// タイムスタンプから月バケット（YYYY-MM）を導出する
///
/// 経費のレポート集計に使用する。
///
/// # 引数
/// * `at` - 対象のタイムスタンプ（UTC）
///
/// # 戻り値
/// "2025-05" 形式の文字列
pub fn month_bucket(at: DateTime<Utc>) -> String {
    format!("{:04}-{:02}", at.year(), at.month())
}

/// 社員コードを生成する
///
/// プロフィールの遅延作成時に使用する。EMP-に続く5桁のランダムな数字。
pub fn generate_employee_code() -> String {
    let number = rand::thread_rng().gen_range(10000..100000);
    format!("EMP-{number}")
}

/// 金額をEUR表記に整形する（通知テンプレート用）
///
/// # 引数
/// * `amount` - 金額（通貨はEUR固定）
pub fn format_eur(amount: f64) -> String {
    format!("€{amount:.2}")
}

/// メールアドレスの形式を簡易チェックする
pub fn is_valid_email(email: &str) -> bool {
    EMAIL_PATTERN.is_match(email)
}
