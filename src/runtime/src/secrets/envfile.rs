//! Environment file parsing and the public/private split.
//!
//! Format: one `KEY=VALUE` per line, `#` comments, optional `export `
//! prefix, single- or double-quoted values. Keys ending in `_PUBLIC` are
//! public and ship as plaintext; every other key is private and gets
//! encrypted.

use std::collections::BTreeMap;
use std::path::Path;

use sealcraft_core::error::{Result, SealError};

/// Suffix marking a variable as public.
pub const PUBLIC_SUFFIX: &str = "_PUBLIC";

/// Public annotation carrying the target instance type.
pub const MACHINE_TYPE_KEY: &str = "SEALCRAFT_MACHINE_TYPE_PUBLIC";

/// Variable selecting the TLS front-end.
pub const DOMAIN_KEY: &str = "DOMAIN";

/// Parsed environment file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvFile {
    vars: BTreeMap<String, String>,
}

/// Variables split by visibility.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvSplit {
    pub public: BTreeMap<String, String>,
    pub private: BTreeMap<String, String>,
}

impl EnvFile {
    /// Read and parse a file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            SealError::precondition(
                format!("Failed to read env file {}: {}", path.display(), e),
                "Check the --env-file path",
            )
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let mut vars = BTreeMap::new();

        for (idx, raw) in content.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let line = line.strip_prefix("export ").map(str::trim_start).unwrap_or(line);

            let (key, value) = line.split_once('=').ok_or_else(|| {
                SealError::Validation(format!("env file line {}: expected KEY=VALUE", idx + 1))
            })?;
            let key = key.trim();
            if !is_valid_key(key) {
                return Err(SealError::Validation(format!(
                    "env file line {}: invalid variable name '{}'",
                    idx + 1,
                    key
                )));
            }

            let value = parse_value(value.trim()).ok_or_else(|| {
                SealError::Validation(format!("env file line {}: unterminated quote", idx + 1))
            })?;
            vars.insert(key.to_string(), value);
        }

        Ok(Self { vars })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Domain for the TLS front-end: `DOMAIN` when set, non-empty and not
    /// `localhost`.
    pub fn domain(&self) -> Option<&str> {
        self.get(DOMAIN_KEY)
            .map(str::trim)
            .filter(|d| !d.is_empty() && !d.eq_ignore_ascii_case("localhost"))
    }

    pub fn requires_tls(&self) -> bool {
        self.domain().is_some()
    }

    /// Split by the `_PUBLIC` suffix convention.
    pub fn split(&self) -> EnvSplit {
        let mut split = EnvSplit::default();
        for (key, value) in &self.vars {
            if key.ends_with(PUBLIC_SUFFIX) {
                split.public.insert(key.clone(), value.clone());
            } else {
                split.private.insert(key.clone(), value.clone());
            }
        }
        split
    }
}

impl EnvSplit {
    /// Public map with the instance-type annotation merged in. The
    /// annotation wins over a user-supplied value of the same key.
    pub fn public_with_machine_type(&self, instance_type: &str) -> BTreeMap<String, String> {
        let mut public = self.public.clone();
        public.insert(MACHINE_TYPE_KEY.to_string(), instance_type.to_string());
        public
    }
}

fn is_valid_key(key: &str) -> bool {
    let mut chars = key.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Parse a value; `None` on an unterminated quote.
fn parse_value(value: &str) -> Option<String> {
    if let Some(rest) = value.strip_prefix('"') {
        let mut out = String::new();
        let mut chars = rest.chars();
        while let Some(c) = chars.next() {
            match c {
                '"' => return Some(out),
                '\\' => match chars.next()? {
                    'n' => out.push('\n'),
                    't' => out.push('\t'),
                    other => out.push(other),
                },
                c => out.push(c),
            }
        }
        None
    } else if let Some(rest) = value.strip_prefix('\'') {
        rest.find('\'').map(|end| rest[..end].to_string())
    } else {
        let unquoted = match value.find(" #") {
            Some(pos) => &value[..pos],
            None => value,
        };
        Some(unquoted.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
# database
DATABASE_URL=postgres://u:p@db/app
export API_KEY="s3cr3t \"quoted\""
GREETING_PUBLIC='hello # not a comment'
PORT_PUBLIC=8080 # trailing comment
EMPTY=
DOMAIN=app.example.com
"#;

    #[test]
    fn test_parse_sample() {
        let env = EnvFile::parse(SAMPLE).unwrap();
        assert_eq!(env.len(), 6);
        assert_eq!(env.get("DATABASE_URL"), Some("postgres://u:p@db/app"));
        assert_eq!(env.get("API_KEY"), Some(r#"s3cr3t "quoted""#));
        assert_eq!(env.get("GREETING_PUBLIC"), Some("hello # not a comment"));
        assert_eq!(env.get("PORT_PUBLIC"), Some("8080"));
        assert_eq!(env.get("EMPTY"), Some(""));
    }

    #[test]
    fn test_split_by_suffix() {
        let split = EnvFile::parse(SAMPLE).unwrap().split();
        assert_eq!(
            split.public.keys().collect::<Vec<_>>(),
            vec!["GREETING_PUBLIC", "PORT_PUBLIC"]
        );
        assert!(split.private.contains_key("DATABASE_URL"));
        assert!(split.private.contains_key("DOMAIN"));
        assert!(!split.private.contains_key("PORT_PUBLIC"));
    }

    #[test]
    fn test_machine_type_annotation() {
        let split = EnvFile::parse("SEALCRAFT_MACHINE_TYPE_PUBLIC=spoofed\n")
            .unwrap()
            .split();
        let public = split.public_with_machine_type("g1-standard-4t");
        assert_eq!(public.get(MACHINE_TYPE_KEY).map(String::as_str), Some("g1-standard-4t"));
    }

    #[test]
    fn test_domain_selects_tls() {
        assert!(EnvFile::parse(SAMPLE).unwrap().requires_tls());
        assert!(!EnvFile::parse("DOMAIN=localhost").unwrap().requires_tls());
        assert!(!EnvFile::parse("DOMAIN=").unwrap().requires_tls());
        assert!(!EnvFile::parse("OTHER=1").unwrap().requires_tls());
        assert_eq!(
            EnvFile::parse("DOMAIN=\" app.example.com \"").unwrap().domain(),
            Some("app.example.com")
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!(EnvFile::parse("NO_EQUALS").is_err());
        assert!(EnvFile::parse("1BAD=x").is_err());
        assert!(EnvFile::parse("BAD-KEY=x").is_err());
        assert!(EnvFile::parse("OPEN=\"never closed").is_err());
        assert!(EnvFile::parse("OPEN='never closed").is_err());
    }

    #[test]
    fn test_later_duplicate_wins() {
        let env = EnvFile::parse("A=1\nA=2\n").unwrap();
        assert_eq!(env.get("A"), Some("2"));
    }

    #[test]
    fn test_load_missing_file_is_precondition() {
        let err = EnvFile::load(Path::new("/nonexistent/.env")).unwrap_err();
        assert!(matches!(err, SealError::Precondition { .. }));
    }

    proptest::proptest! {
        #[test]
        fn prop_split_partitions_variables(
            vars in proptest::collection::btree_map("[A-Z][A-Z0-9_]{0,12}", "[a-zA-Z0-9_./:-]{1,20}", 0..16)
        ) {
            let content: String = vars.iter().map(|(k, v)| format!("{}={}\n", k, v)).collect();
            let env = EnvFile::parse(&content).unwrap();
            proptest::prop_assert_eq!(env.len(), vars.len());

            let split = env.split();
            proptest::prop_assert_eq!(split.public.len() + split.private.len(), vars.len());
            for (key, value) in &vars {
                let side = if key.ends_with(PUBLIC_SUFFIX) { &split.public } else { &split.private };
                proptest::prop_assert_eq!(side.get(key), Some(value));
            }
        }
    }
}
