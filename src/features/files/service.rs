//! ファイルサービス
//!
//! ブロブストアへのパススルー操作に、サイズ・MIMEの検証と
//! アップロード前の画像圧縮を足したもの。

use std::collections::BTreeMap;
use std::io::Cursor;
use std::sync::Arc;

use futures::future::join_all;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use log::{debug, info, warn};
use uuid::Uuid;

use super::models::{
    MultiUploadOutcome, StorageStats, UploadInput, ALLOWED_MIME_TYPES, DEFAULT_JPEG_QUALITY,
    MAX_FILE_SIZE, MAX_IMAGE_HEIGHT, MAX_IMAGE_WIDTH,
};
use crate::backend::{BackendClient, FileMeta};
use crate::shared::errors::{AppError, AppResult};

pub struct FileService {
    backend: Arc<dyn BackendClient>,
}

impl FileService {
    pub fn new(backend: Arc<dyn BackendClient>) -> Self {
        Self { backend }
    }

    /// アップロード前のポリシー検証
    ///
    /// 最大サイズちょうどは受理し、1バイト超過から拒否する。
    /// MIMEタイプは許可リストにないものをサイズに関わらず拒否する。
    ///
    /// # 引数
    /// * `mime_type` - ファイルのMIMEタイプ
    /// * `size` - ファイルサイズ（バイト）
    pub fn validate(&self, mime_type: &str, size: u64) -> AppResult<()> {
        if size > MAX_FILE_SIZE {
            return Err(AppError::invalid_input(
                "ファイルが大きすぎます（最大20MB）",
            ));
        }
        if !ALLOWED_MIME_TYPES.contains(&mime_type) {
            return Err(AppError::invalid_input(
                "このファイル形式は使用できません（JPG・PNG・PDFのみ）",
            ));
        }
        Ok(())
    }

    /// ファイルをアップロードする
    pub async fn upload(&self, input: UploadInput) -> AppResult<FileMeta> {
        self.validate(&input.mime_type, input.bytes.len() as u64)?;

        let meta = self
            .backend
            .create_file(
                &Uuid::new_v4().to_string(),
                &input.name,
                &input.mime_type,
                input.bytes,
            )
            .await?;
        info!("ファイルをアップロードしました: file_id={} name={}", meta.id, meta.name);
        Ok(meta)
    }

    /// 複数ファイルを並行アップロードする
    ///
    /// 各アップロードは独立で、一部の失敗が残りを止めることはない。
    pub async fn upload_multiple(&self, inputs: Vec<UploadInput>) -> MultiUploadOutcome {
        let names: Vec<String> = inputs.iter().map(|i| i.name.clone()).collect();
        let uploads = inputs.into_iter().map(|input| self.upload(input));
        let results = join_all(uploads).await;

        let mut uploaded = Vec::new();
        let mut failed = Vec::new();
        for (name, result) in names.into_iter().zip(results) {
            match result {
                Ok(meta) => uploaded.push(meta),
                Err(e) => {
                    warn!("アップロードに失敗しました: name={name} error={e}");
                    failed.push(name);
                }
            }
        }
        MultiUploadOutcome { uploaded, failed }
    }

    /// ファイル情報を取得する（見つからない・失敗時は `None` に回復）
    pub async fn file_info(&self, file_id: &str) -> Option<FileMeta> {
        match self.backend.get_file(file_id).await {
            Ok(meta) => Some(meta),
            Err(e) => {
                debug!("ファイル情報を取得できませんでした: file_id={file_id} error={e}");
                None
            }
        }
    }

    /// ファイルを削除する
    ///
    /// # 戻り値
    /// 削除できた場合true（失敗はログに残してfalseに回復）
    pub async fn delete(&self, file_id: &str) -> bool {
        match self.backend.delete_file(file_id).await {
            Ok(()) => true,
            Err(e) => {
                warn!("ファイルを削除できませんでした: file_id={file_id} error={e}");
                false
            }
        }
    }

    /// バケット内のファイル一覧を取得する
    pub async fn list(&self) -> AppResult<Vec<FileMeta>> {
        Ok(self.backend.list_files().await?)
    }

    /// 閲覧用URLを返す
    pub fn view_url(&self, file_id: &str) -> String {
        self.backend.file_view_url(file_id)
    }

    /// ダウンロード用URLを返す
    pub fn download_url(&self, file_id: &str) -> String {
        self.backend.file_download_url(file_id)
    }

    /// プレビュー用URLを返す（画像の縮小表示向け）
    pub fn preview_url(&self, file_id: &str, width: Option<u32>, height: Option<u32>) -> String {
        self.backend.file_preview_url(file_id, width, height)
    }

    /// アップロード前に画像を縮小・再圧縮する
    ///
    /// 横長なら幅を `MAX_IMAGE_WIDTH`、縦長なら高さを `MAX_IMAGE_HEIGHT`
    /// に収まるよう縦横比を保って縮小する（バウンドは向きごとに片辺のみ）。
    /// JPEGは品質指定で、PNGは品質指定なしで再エンコードする。
    ///
    /// # 引数
    /// * `bytes` - 元画像のバイト列
    /// * `mime_type` - `image/jpeg` または `image/png`
    /// * `quality` - JPEG品質（未指定時は既定値）
    pub fn compress_image(
        &self,
        bytes: &[u8],
        mime_type: &str,
        quality: Option<u8>,
    ) -> AppResult<Vec<u8>> {
        let image = image::load_from_memory(bytes)
            .map_err(|e| AppError::invalid_input(format!("画像を読み込めません: {e}")))?;

        let (width, height) = (image.width(), image.height());
        let (new_width, new_height) = if width > height {
            if width > MAX_IMAGE_WIDTH {
                let scaled = (height as f64 * MAX_IMAGE_WIDTH as f64 / width as f64).round();
                (MAX_IMAGE_WIDTH, scaled as u32)
            } else {
                (width, height)
            }
        } else if height > MAX_IMAGE_HEIGHT {
            let scaled = (width as f64 * MAX_IMAGE_HEIGHT as f64 / height as f64).round();
            (scaled as u32, MAX_IMAGE_HEIGHT)
        } else {
            (width, height)
        };

        let resized = if (new_width, new_height) != (width, height) {
            image.resize_exact(new_width, new_height, FilterType::Triangle)
        } else {
            image
        };

        let mut buffer = Vec::new();
        match mime_type {
            "image/jpeg" => {
                let mut encoder = JpegEncoder::new_with_quality(
                    &mut buffer,
                    quality.unwrap_or(DEFAULT_JPEG_QUALITY),
                );
                encoder
                    .encode_image(&resized)
                    .map_err(|e| AppError::unexpected(format!("JPEG圧縮に失敗しました: {e}")))?;
            }
            "image/png" => {
                resized
                    .write_to(&mut Cursor::new(&mut buffer), image::ImageFormat::Png)
                    .map_err(|e| AppError::unexpected(format!("PNG再エンコードに失敗しました: {e}")))?;
            }
            other => {
                return Err(AppError::invalid_input(format!(
                    "圧縮できない形式です: {other}"
                )))
            }
        }
        Ok(buffer)
    }

    /// ストレージ使用状況を集計する
    pub async fn storage_stats(&self) -> AppResult<StorageStats> {
        let files = self.backend.list_files().await?;

        let mut by_extension: BTreeMap<String, usize> = BTreeMap::new();
        let mut total_size = 0u64;
        for file in &files {
            total_size += file.size;
            let extension = file
                .name
                .rsplit_once('.')
                .map(|(_, ext)| ext.to_lowercase())
                .unwrap_or_else(|| "unknown".to_string());
            *by_extension.entry(extension).or_insert(0) += 1;
        }

        Ok(StorageStats {
            total_files: files.len(),
            total_size,
            by_extension,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MemoryBackend, StorageApi};
    use image::DynamicImage;

    fn service_with_backend() -> (FileService, Arc<MemoryBackend>) {
        let backend = Arc::new(MemoryBackend::new());
        let service = FileService::new(backend.clone());
        (service, backend)
    }

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let image = DynamicImage::new_rgb8(width, height);
        let mut buffer = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut buffer), image::ImageFormat::Png)
            .unwrap();
        buffer
    }

    #[test]
    fn test_validation_boundary() {
        let (service, _) = service_with_backend();

        // 最大サイズちょうどは受理、1バイト超過で拒否
        assert!(service.validate("image/jpeg", MAX_FILE_SIZE).is_ok());
        assert!(matches!(
            service.validate("image/jpeg", MAX_FILE_SIZE + 1),
            Err(AppError::InvalidInput(_))
        ));

        // 許可リスト外のMIMEはサイズに関わらず拒否
        assert!(matches!(
            service.validate("application/zip", 10),
            Err(AppError::InvalidInput(_))
        ));
        assert!(service.validate("application/pdf", 1024).is_ok());
    }

    #[tokio::test]
    async fn test_upload_rejects_invalid_file() {
        let (service, backend) = service_with_backend();

        let result = service
            .upload(UploadInput {
                name: "arquivo.zip".to_string(),
                mime_type: "application/zip".to_string(),
                bytes: vec![0u8; 16],
            })
            .await;
        assert!(matches!(result, Err(AppError::InvalidInput(_))));
        assert!(backend.list_files().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_upload_multiple_reports_per_file() {
        let (service, _) = service_with_backend();

        let outcome = service
            .upload_multiple(vec![
                UploadInput {
                    name: "recibo.jpg".to_string(),
                    mime_type: "image/jpeg".to_string(),
                    bytes: vec![0u8; 32],
                },
                UploadInput {
                    name: "arquivo.zip".to_string(),
                    mime_type: "application/zip".to_string(),
                    bytes: vec![0u8; 32],
                },
                UploadInput {
                    name: "mapa.pdf".to_string(),
                    mime_type: "application/pdf".to_string(),
                    bytes: vec![0u8; 32],
                },
            ])
            .await;

        assert_eq!(outcome.uploaded.len(), 2);
        assert_eq!(outcome.failed, vec!["arquivo.zip".to_string()]);
    }

    #[tokio::test]
    async fn test_file_info_and_delete_recover() {
        let (service, _) = service_with_backend();

        assert!(service.file_info("nao-existe").await.is_none());
        assert!(!service.delete("nao-existe").await);

        let meta = service
            .upload(UploadInput {
                name: "recibo.jpg".to_string(),
                mime_type: "image/jpeg".to_string(),
                bytes: vec![0u8; 32],
            })
            .await
            .unwrap();
        assert!(service.file_info(&meta.id).await.is_some());
        assert!(service.delete(&meta.id).await);
    }

    #[test]
    fn test_compress_bounds_landscape_width() {
        let (service, _) = service_with_backend();

        let compressed = service
            .compress_image(&png_bytes(3840, 1000), "image/png", None)
            .unwrap();
        let result = image::load_from_memory(&compressed).unwrap();
        assert_eq!(result.width(), 1920);
        assert_eq!(result.height(), 500);
    }

    #[test]
    fn test_compress_bounds_portrait_height() {
        let (service, _) = service_with_backend();

        let compressed = service
            .compress_image(&png_bytes(1000, 2160), "image/jpeg", Some(70))
            .unwrap();
        let result = image::load_from_memory(&compressed).unwrap();
        assert_eq!(result.width(), 500);
        assert_eq!(result.height(), 1080);
    }

    #[test]
    fn test_compress_keeps_small_images() {
        let (service, _) = service_with_backend();

        let compressed = service
            .compress_image(&png_bytes(640, 480), "image/png", None)
            .unwrap();
        let result = image::load_from_memory(&compressed).unwrap();
        assert_eq!((result.width(), result.height()), (640, 480));
    }

    #[test]
    fn test_compress_rejects_broken_image() {
        let (service, _) = service_with_backend();
        assert!(matches!(
            service.compress_image(b"not an image", "image/jpeg", None),
            Err(AppError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_storage_stats_extension_tally() {
        let (service, _) = service_with_backend();

        for (name, mime) in [
            ("a.jpg", "image/jpeg"),
            ("b.JPG", "image/jpeg"),
            ("c.pdf", "application/pdf"),
            ("semextensao", "application/pdf"),
        ] {
            service
                .upload(UploadInput {
                    name: name.to_string(),
                    mime_type: mime.to_string(),
                    bytes: vec![0u8; 10],
                })
                .await
                .unwrap();
        }

        let stats = service.storage_stats().await.unwrap();
        assert_eq!(stats.total_files, 4);
        assert_eq!(stats.total_size, 40);
        assert_eq!(stats.by_extension.get("jpg"), Some(&2));
        assert_eq!(stats.by_extension.get("pdf"), Some(&1));
        assert_eq!(stats.by_extension.get("unknown"), Some(&1));
    }
}
