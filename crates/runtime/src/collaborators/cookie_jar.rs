//! Cookie jar collaborator (spec §6): a per-site file of packed
//! `[len:u16][name=value; ][expire:u32 BE]` records.
//!
//! Grounded on the cookie persistence format in
//! `examples/original_source/jni/ria/ria_http.c`: each cookie is stored as
//! its `Set-Cookie` "name=value" text plus a big-endian expiry timestamp,
//! length-prefixed so records can be walked without scanning for a
//! delimiter that might appear inside the value.

use std::path::Path;

#[derive(Debug, Clone)]
pub struct Cookie {
    pub name_value: String,
    pub expires_at: u32,
}

#[derive(Default)]
pub struct CookieJar {
    cookies: Vec<Cookie>,
}

impl CookieJar {
    pub fn new() -> Self {
        CookieJar { cookies: Vec::new() }
    }

    pub fn set(&mut self, name_value: String, expires_at: u32) {
        let name = name_value.split('=').next().unwrap_or(&name_value).to_string();
        self.cookies.retain(|c| !c.name_value.starts_with(&format!("{name}=")));
        self.cookies.push(Cookie { name_value, expires_at });
    }

    /// Drops cookies whose `expires_at` is at or before `now` (0 means
    /// session-only, never pruned here).
    pub fn prune_expired(&mut self, now: u32) {
        self.cookies.retain(|c| c.expires_at == 0 || c.expires_at > now);
    }

    pub fn header_value(&self) -> String {
        self.cookies.iter().map(|c| c.name_value.as_str()).collect::<Vec<_>>().join("; ")
    }

    pub fn load(&mut self, path: &Path) -> Result<(), String> {
        let bytes = std::fs::read(path).map_err(|e| e.to_string())?;
        self.cookies = decode(&bytes)?;
        Ok(())
    }

    pub fn save(&self, path: &Path) -> Result<(), String> {
        std::fs::write(path, encode(&self.cookies)).map_err(|e| e.to_string())
    }
}

fn encode(cookies: &[Cookie]) -> Vec<u8> {
    let mut out = Vec::new();
    for c in cookies {
        let text = c.name_value.as_bytes();
        out.extend_from_slice(&(text.len() as u16).to_be_bytes());
        out.extend_from_slice(text);
        out.extend_from_slice(&c.expires_at.to_be_bytes());
    }
    out
}

fn decode(bytes: &[u8]) -> Result<Vec<Cookie>, String> {
    let mut cookies = Vec::new();
    let mut cursor = 0usize;
    while cursor < bytes.len() {
        let len = bytes
            .get(cursor..cursor + 2)
            .map(|b| u16::from_be_bytes([b[0], b[1]]) as usize)
            .ok_or("truncated cookie record length")?;
        cursor += 2;
        let text = bytes.get(cursor..cursor + len).ok_or("truncated cookie record body")?;
        cursor += len;
        let expires = bytes
            .get(cursor..cursor + 4)
            .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
            .ok_or("truncated cookie record expiry")?;
        cursor += 4;
        cookies.push(Cookie { name_value: String::from_utf8_lossy(text).into_owned(), expires_at: expires });
    }
    Ok(cookies)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_bytes() {
        let mut jar = CookieJar::new();
        jar.set("sid=abc123".to_string(), 1_700_000_000);
        jar.set("theme=dark".to_string(), 0);
        let bytes = encode(&jar.cookies);
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[0].name_value, "sid=abc123");
    }

    #[test]
    fn prune_drops_expired_but_keeps_session_cookies() {
        let mut jar = CookieJar::new();
        jar.set("a=1".to_string(), 100);
        jar.set("b=2".to_string(), 0);
        jar.prune_expired(200);
        assert_eq!(jar.header_value(), "b=2");
    }

    #[test]
    fn set_replaces_existing_cookie_with_same_name() {
        let mut jar = CookieJar::new();
        jar.set("a=1".to_string(), 0);
        jar.set("a=2".to_string(), 0);
        assert_eq!(jar.header_value(), "a=2");
    }
}
