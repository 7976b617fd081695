use base64::{Engine as _, engine::general_purpose};
use sha2::{Digest, Sha256};

const SHORT_HASH_LEN: usize = 8;

/// Sibling path used when a bundle target collides with an ordinary file.
///
/// `js/old.js` becomes `js/old_aio.js`.
pub fn aio_sibling_path(subpath: &str) -> String {
    let name_start = subpath.rfind('/').map_or(0, |index| index + 1);
    match subpath[name_start..].rfind('.') {
        Some(dot) if dot > 0 => {
            let dot = name_start + dot;
            format!("{}_aio{}", &subpath[..dot], &subpath[dot..])
        }
        _ => format!("{subpath}_aio"),
    }
}

/// Short URL-safe digest of `bytes`.
pub fn short_hash(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut encoded = general_purpose::URL_SAFE_NO_PAD.encode(digest);
    encoded.truncate(SHORT_HASH_LEN);
    encoded
}

/// Release path carrying the content hash: `pkg/all.js` becomes `pkg/all_<hash>.js`.
pub fn hashed_subpath(subpath: &str, content: &[u8]) -> String {
    let hash = short_hash(content);
    let name_start = subpath.rfind('/').map_or(0, |index| index + 1);
    match subpath[name_start..].rfind('.') {
        Some(dot) if dot > 0 => {
            let dot = name_start + dot;
            format!("{}_{hash}{}", &subpath[..dot], &subpath[dot..])
        }
        _ => format!("{subpath}_{hash}"),
    }
}
