//! ファイル機能のデータモデルとポリシー定数

use std::collections::BTreeMap;

use serde::Serialize;

use crate::backend::FileMeta;

/// アップロード可能な最大サイズ（20MiB、境界値を含む）
pub const MAX_FILE_SIZE: u64 = 20 * 1024 * 1024;

/// 許可するMIMEタイプ
pub const ALLOWED_MIME_TYPES: [&str; 3] = ["image/jpeg", "image/png", "application/pdf"];

/// 画像の長辺の上限（横長の場合）
pub const MAX_IMAGE_WIDTH: u32 = 1920;

/// 画像の長辺の上限（縦長の場合）
pub const MAX_IMAGE_HEIGHT: u32 = 1080;

/// JPEG再エンコード時の既定品質
pub const DEFAULT_JPEG_QUALITY: u8 = 80;

/// アップロードする1ファイル分の入力
#[derive(Debug, Clone)]
pub struct UploadInput {
    pub name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// 複数ファイルアップロードの結果
///
/// 一部の失敗が全体を止めることはなく、ファイル単位で成否を報告する。
#[derive(Debug, Clone)]
pub struct MultiUploadOutcome {
    pub uploaded: Vec<FileMeta>,
    /// アップロードに失敗したファイル名
    pub failed: Vec<String>,
}

/// ストレージ使用状況
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageStats {
    pub total_files: usize,
    pub total_size: u64,
    /// 拡張子（小文字）ごとのファイル数
    pub by_extension: BTreeMap<String, usize>,
}
