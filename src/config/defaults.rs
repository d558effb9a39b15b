//! Default values for configuration fields.
//!
//! These functions are used by serde for default deserialization.

// ============================================================================
// Common Defaults
// ============================================================================

pub fn r#true() -> bool {
    true
}

pub fn r#false() -> bool {
    false
}

// ============================================================================
// [cms] Section Defaults
// ============================================================================

pub mod cms {
    pub fn release() -> String {
        "master".into()
    }

    pub fn link_resolver() -> String {
        "/{type}/{uid}/".into()
    }

    pub fn preview_cookie() -> String {
        "io.prismic.preview".into()
    }

    pub fn timeout() -> String {
        "30s".into()
    }
}

// ============================================================================
// [build] Section Defaults
// ============================================================================

pub mod build {
    use std::path::PathBuf;

    pub fn root() -> Option<PathBuf> {
        None
    }

    pub fn source() -> PathBuf {
        "src".into()
    }

    pub fn output() -> PathBuf {
        "builds".into()
    }

    pub fn data() -> PathBuf {
        "_data".into()
    }

    pub fn timeout() -> String {
        "10m".into()
    }

    pub mod replace {
        pub fn extension() -> String {
            "html".into()
        }
    }
}

// ============================================================================
// [serve] Section Defaults
// ============================================================================

pub mod serve {
    pub fn interface() -> String {
        "127.0.0.1".into()
    }

    pub fn port() -> u16 {
        3000
    }
}

// ============================================================================
// [preview] Section Defaults
// ============================================================================

pub mod preview {
    pub fn age() -> String {
        "1h".into()
    }

    pub fn script() -> String {
        concat!(
            "<script async\n",
            "           type=\"text/javascript\"\n",
            "           src=\"//static.cdn.prismic.io/prismic.min.js\"></script>\n",
        )
        .into()
    }
}
