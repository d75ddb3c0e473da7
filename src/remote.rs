/// A parsed remote: lower-cased host plus path segments.
///
/// `https://github.com/acme/api.git`, `ssh://git@github.com:22/acme/api` and
/// `git@github.com:acme/api.git` all reduce to `github.com/acme/api`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Remote {
    pub host: String,
    pub segments: Vec<String>,
}

impl Remote {
    pub fn parse(raw: &str) -> Option<Remote> {
        let lowered = raw.trim().to_lowercase();
        if lowered.is_empty() || lowered.contains(char::is_whitespace) {
            return None;
        }

        let (authority, path) = if let Some((_, rest)) = lowered.split_once("://") {
            match rest.split_once('/') {
                Some((authority, path)) => (authority.to_string(), path.to_string()),
                None => (rest.to_string(), String::new()),
            }
        } else if is_scp_like(&lowered) {
            let (authority, path) = lowered.split_once(':')?;
            (authority.to_string(), path.to_string())
        } else {
            match lowered.split_once('/') {
                Some((authority, path)) => (authority.to_string(), path.to_string()),
                None => (lowered.clone(), String::new()),
            }
        };

        let host = authority
            .rsplit_once('@')
            .map(|(_, host)| host)
            .unwrap_or(&authority);
        let host = host.split(':').next().unwrap_or_default().to_string();
        if host.is_empty() {
            return None;
        }

        let mut segments: Vec<String> = path
            .split('/')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        if let Some(last) = segments.last_mut() {
            if let Some(stripped) = last.strip_suffix(".git") {
                *last = stripped.to_string();
            }
        }
        segments.retain(|s| !s.is_empty());

        Some(Remote { host, segments })
    }

    /// `host/seg/seg` form used for substring matching
    pub fn normalized(&self) -> String {
        if self.segments.is_empty() {
            self.host.clone()
        } else {
            format!("{}/{}", self.host, self.segments.join("/"))
        }
    }

    /// First path segment, the user or organization on hosted forges
    pub fn owner(&self) -> Option<&str> {
        self.segments.first().map(String::as_str)
    }

    pub fn repo(&self) -> Option<&str> {
        if self.segments.len() >= 2 {
            self.segments.last().map(String::as_str)
        } else {
            None
        }
    }

    /// `host/owner`, or the bare host when the remote has no path
    pub fn owner_prefix(&self) -> String {
        match self.owner() {
            Some(owner) => format!("{}/{}", self.host, owner),
            None => self.host.clone(),
        }
    }

    pub fn host_matches_domain(&self, domain: &str) -> bool {
        let domain = domain.trim().trim_start_matches('.');
        !domain.is_empty()
            && (self.host == domain
                || self
                    .host
                    .strip_suffix(domain)
                    .is_some_and(|head| head.ends_with('.')))
    }
}

/// `user@host:path` with no slash before the colon
fn is_scp_like(value: &str) -> bool {
    match (value.find('@'), value.find(':'), value.find('/')) {
        (Some(at), Some(colon), slash) => at < colon && slash.map_or(true, |s| colon < s),
        _ => false,
    }
}

/// Whether a context key names a remote rather than a filesystem path
pub fn looks_like_remote(value: &str) -> bool {
    let value = value.trim();
    value.contains("://") || is_scp_like(value)
}
