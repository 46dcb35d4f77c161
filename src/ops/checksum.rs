use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::io::AsyncReadExt;

/// SHA-256 of a file as lowercase hex, plus its size in bytes
pub async fn sha256_file(path: &Path) -> std::io::Result<(String, u64)> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];
    let mut size = 0u64;

    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        size += n as u64;
    }

    Ok((format!("{:x}", hasher.finalize()), size))
}

/// Compare hex digests ignoring case and surrounding whitespace
pub fn digests_match(expected: &str, actual: &str) -> bool {
    expected.trim().eq_ignore_ascii_case(actual.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hashes_file_contents() {
        let path = std::env::temp_dir().join(format!("cms-checksum-{}", uuid::Uuid::new_v4()));
        tokio::fs::write(&path, b"abc").await.unwrap();

        let (digest, size) = sha256_file(&path).await.unwrap();
        assert_eq!(digest, "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad");
        assert_eq!(size, 3);

        tokio::fs::remove_file(&path).await.unwrap();
    }

    #[test]
    fn digest_comparison_ignores_case() {
        assert!(digests_match("ABCDEF ", "abcdef"));
        assert!(!digests_match("abc", "abd"));
    }
}
