use std::fmt;

/// Which variant the build tool should produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildMode {
    Full,
    Minified,
}

impl BuildMode {
    /// The positional argument handed to the build executable.
    pub fn as_arg(&self) -> &'static str {
        match self {
            BuildMode::Full => "full",
            BuildMode::Minified => "minified",
        }
    }
}

impl fmt::Display for BuildMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_arg())
    }
}

/// Presence-only flags pulled off the query string.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildRequest {
    pub submit: bool,
    pub get_mini: bool,
}

impl BuildRequest {
    /// Parses a raw query string. Values are ignored; only the keys matter.
    /// Never fails, bad percent-encoding is decoded lossily.
    pub fn from_query(query: Option<&str>) -> Self {
        let mut request = BuildRequest::default();

        for (key, _) in url::form_urlencoded::parse(query.unwrap_or("").as_bytes()) {
            match key.as_ref() {
                "submit" => request.submit = true,
                "getMini" => request.get_mini = true,
                _ => {}
            }
        }

        request
    }

    pub fn mode(&self) -> BuildMode {
        if self.get_mini {
            BuildMode::Minified
        } else {
            BuildMode::Full
        }
    }
}
