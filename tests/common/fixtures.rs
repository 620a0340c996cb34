//! Pin fixtures and temporary registries

use std::path::{Path, PathBuf};
use std::time::Duration;

use tempfile::TempDir;

use pinstream::{Address, ConnectionRegistry, PinPoint, SavedImage, SavedPin, SqliteConnectionRegistry};

/// A stored pin at `point_url` with the given name
pub fn saved_pin(point_url: &str, custom_name: &str) -> SavedPin {
    SavedPin {
        point_url: point_url.to_string(),
        point: PinPoint::from_key(point_url).expect("fixture key must be a point"),
        custom_name: custom_name.to_string(),
        address: Some(Address(serde_json::json!({
            "display_name": format!("Somewhere near {}", point_url)
        }))),
        source_ip: "127.0.0.1".to_string(),
        created: 1_700_000_000_000,
        image: None,
        thumbnail: None,
    }
}

/// A stored pin carrying an original image and a public thumbnail
pub fn saved_pin_with_image(point_url: &str) -> SavedPin {
    let image = |prefix: &str, url: Option<&str>| SavedImage {
        name: "photo.jpg".to_string(),
        content_type: "image/jpeg".to_string(),
        size: 2048,
        last_modified: 1_700_000_000_000,
        s3key: format!("{}/{}_0001.jpg", prefix, point_url),
        url: url.map(str::to_string),
    };
    SavedPin {
        image: Some(image("original", None)),
        thumbnail: Some(image("thumbnail", Some("https://cdn.example.com/thumb.jpg"))),
        ..saved_pin(point_url, "with photo")
    }
}

/// An on-disk registry in a temporary directory
pub struct TestRegistry {
    dir: TempDir,
}

impl TestRegistry {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp dir"),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.path().join("registry").join("connections.db")
    }

    /// Open a fresh handle on the same database
    pub fn open(&self) -> SqliteConnectionRegistry {
        SqliteConnectionRegistry::open(&self.path()).expect("Failed to open registry")
    }

    /// Open a handle and register `ids`
    pub fn seeded(&self, ids: &[&str]) -> SqliteConnectionRegistry {
        let registry = self.open();
        for id in ids {
            registry.add(id).expect("Failed to seed registry");
        }
        registry
    }
}

/// Poll `condition` every 10ms until it holds or `timeout` passes
pub async fn eventually<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

pub fn ids(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}
