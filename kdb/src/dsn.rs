//! Connection string parsing shared by the adapters.
//!
//! Connection strings look like
//! `<scheme>://[user[:pass]@]host[,host2...][/path][?opt=val&...]`. The
//! authority is split by hand because a comma separated host list is not a
//! valid URL authority; the query is decoded with the `url` crate's
//! `form_urlencoded` codec. User name and password are percent-decoded.

use crate::errors::{ErrorKind, KdbError, KdbResult};
use crate::store::{BatchLimits, DEFAULT_ITERATOR_BUFFER};
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use thiserror::Error;
use url::form_urlencoded;

pub const PARAM_COMPRESSION: &str = "compression";
pub const PARAM_THRESHOLD: &str = "threshold";
pub const PARAM_BATCH_SIZE: &str = "batch_size";
pub const PARAM_BATCH_BYTES: &str = "batch_bytes";
pub const PARAM_BUFFER: &str = "buffer";

// characters escaped when userinfo is written back out
const USERINFO: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b',')
    .add(b'/')
    .add(b':')
    .add(b';')
    .add(b'<')
    .add(b'=')
    .add(b'>')
    .add(b'?')
    .add(b'@')
    .add(b'[')
    .add(b'\\')
    .add(b']')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

#[derive(Error, Debug)]
pub enum DsnError {
    #[error("connection string {0:?} has no scheme")]
    MissingScheme(String),
    #[error("connection string parameter {name}={value:?} is invalid")]
    InvalidParam { name: String, value: String },
    #[error("connection string credentials are not valid percent-encoded UTF-8")]
    InvalidUserinfo(#[source] std::str::Utf8Error),
}

impl From<DsnError> for KdbError {
    fn from(err: DsnError) -> Self {
        KdbError::new_with_cause(&err.to_string(), ErrorKind::InvalidConnectionString, err)
    }
}

/// Parsed form of a connection string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionString {
    scheme: String,
    username: Option<String>,
    password: Option<String>,
    hosts: Vec<String>,
    path: String,
    params: Vec<(String, String)>,
}

impl ConnectionString {
    pub fn parse(dsn: &str) -> KdbResult<ConnectionString> {
        let (scheme, rest) = match dsn.split_once(':') {
            Some((scheme, rest)) if !scheme.is_empty() => (scheme, rest),
            _ => return Err(DsnError::MissingScheme(dsn.to_string()).into()),
        };
        let rest = rest.strip_prefix("//").unwrap_or(rest);

        let (rest, query) = match rest.split_once('?') {
            Some((rest, query)) => (rest, query),
            None => (rest, ""),
        };
        let (authority, path) = match rest.find('/') {
            Some(index) => rest.split_at(index),
            None => (rest, ""),
        };
        let (userinfo, hosts) = match authority.rsplit_once('@') {
            Some((userinfo, hosts)) => (Some(userinfo), hosts),
            None => (None, authority),
        };
        let (username, password) = match userinfo {
            Some(userinfo) => match userinfo.split_once(':') {
                Some((user, pass)) => {
                    (Some(decode_userinfo(user)?), Some(decode_userinfo(pass)?))
                }
                None => (Some(decode_userinfo(userinfo)?), None),
            },
            None => (None, None),
        };
        let hosts = hosts
            .split(',')
            .filter(|host| !host.is_empty())
            .map(|host| host.to_string())
            .collect();
        let params = form_urlencoded::parse(query.as_bytes())
            .map(|(name, value)| (name.into_owned(), value.into_owned()))
            .collect();

        Ok(ConnectionString {
            scheme: scheme.to_string(),
            username,
            password,
            hosts,
            path: path.to_string(),
            params,
        })
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    pub fn hosts(&self) -> &[String] {
        &self.hosts
    }

    /// Path including its leading `/`, empty when absent.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Host and path joined, the way embedded stores name their directory.
    pub fn location(&self) -> String {
        format!("{}{}", self.hosts.join(","), self.path)
    }

    /// Last value of a query parameter.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .rev()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }

    /// Removes every occurrence of a parameter, returning its last value.
    pub fn take_param(&mut self, name: &str) -> Option<String> {
        let value = self.param(name).map(|value| value.to_string());
        self.params.retain(|(key, _)| key != name);
        value
    }

    /// Parses a parameter, `None` if it is absent.
    pub fn parse_param<T: FromStr>(&self, name: &str) -> KdbResult<Option<T>> {
        match self.param(name) {
            None => Ok(None),
            Some(value) => value.parse::<T>().map(Some).map_err(|_| {
                DsnError::InvalidParam {
                    name: name.to_string(),
                    value: value.to_string(),
                }
                .into()
            }),
        }
    }

    pub fn compression(&self) -> &str {
        self.param(PARAM_COMPRESSION).unwrap_or_default()
    }

    pub fn threshold(&self) -> KdbResult<i64> {
        Ok(self.parse_param(PARAM_THRESHOLD)?.unwrap_or(0))
    }

    pub fn batch_limits(&self) -> KdbResult<BatchLimits> {
        let defaults = BatchLimits::default();
        let max_entries = self
            .parse_param(PARAM_BATCH_SIZE)?
            .unwrap_or(defaults.max_entries);
        let max_bytes = self
            .parse_param(PARAM_BATCH_BYTES)?
            .unwrap_or(defaults.max_bytes);
        Ok(BatchLimits::new(max_entries, max_bytes))
    }

    pub fn buffer(&self) -> KdbResult<usize> {
        Ok(self
            .parse_param(PARAM_BUFFER)?
            .unwrap_or(DEFAULT_ITERATOR_BUFFER))
    }

    /// Removes the parameters kdb itself consumes, leaving only those meant
    /// for the backend client.
    pub fn strip_store_params(&mut self) {
        for name in [
            PARAM_COMPRESSION,
            PARAM_THRESHOLD,
            PARAM_BATCH_SIZE,
            PARAM_BATCH_BYTES,
            PARAM_BUFFER,
        ] {
            self.take_param(name);
        }
    }
}

impl FromStr for ConnectionString {
    type Err = KdbError;

    fn from_str(dsn: &str) -> Result<Self, Self::Err> {
        ConnectionString::parse(dsn)
    }
}

fn decode_userinfo(raw: &str) -> KdbResult<String> {
    let decoded = percent_decode_str(raw)
        .decode_utf8()
        .map_err(DsnError::InvalidUserinfo)?;
    Ok(decoded.into_owned())
}

impl Display for ConnectionString {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}://", self.scheme)?;
        if let Some(username) = &self.username {
            write!(f, "{}", utf8_percent_encode(username, USERINFO))?;
            if let Some(password) = &self.password {
                write!(f, ":{}", utf8_percent_encode(password, USERINFO))?;
            }
            write!(f, "@")?;
        }
        write!(f, "{}{}", self.hosts.join(","), self.path)?;
        if !self.params.is_empty() {
            let query = form_urlencoded::Serializer::new(String::new())
                .extend_pairs(self.params.iter())
                .finish();
            write!(f, "?{}", query)?;
        }
        Ok(())
    }
}
