//! Resource identities and their string encoding.
//!
//! The orchestrator persists a single opaque string per resource instance. An
//! [`IdentityScheme`] turns that string into a typed [`Identity`] (validating
//! it before any remote call is made) and back again, and knows which spec
//! attributes the identity is built from.
//!
//! For every valid identity `x` of a scheme, `scheme.decode(&x.encode())`
//! returns `x`.

use std::fmt;
use std::str::FromStr;

use serde_json::{Map, Value};

use crate::error::ProviderError;

/// The stable key of a remote object.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Identity {
    /// A single name, identical to one spec attribute.
    Simple(String),
    /// Several spec attributes joined with a separator.
    Composite {
        /// The parts, in scheme field order.
        parts: Vec<String>,
        /// The separator used when encoding.
        separator: char,
    },
    /// A server-assigned token unrelated to the spec.
    Opaque(String),
    /// A structured resource name.
    Arn(Arn),
}

impl Identity {
    /// Encode to the string persisted in state.
    pub fn encode(&self) -> String {
        match self {
            Self::Simple(name) | Self::Opaque(name) => name.clone(),
            Self::Composite { parts, separator } => parts.join(&separator.to_string()),
            Self::Arn(arn) => arn.to_string(),
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

/// An `arn:partition:service:region:account:resource` name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Arn {
    /// Partition, e.g. `aws`.
    pub partition: String,
    /// Service namespace, e.g. `logs`.
    pub service: String,
    /// Region; empty for global resources.
    pub region: String,
    /// Account id; may be empty.
    pub account_id: String,
    /// Resource path; may itself contain `:`.
    pub resource: String,
}

impl FromStr for Arn {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.splitn(6, ':').collect();
        if parts.len() != 6 || parts[0] != "arn" {
            return Err(ProviderError::Format(format!(
                "{:?} is not an ARN (expected arn:partition:service:region:account:resource)",
                s
            )));
        }
        let arn = Arn {
            partition: parts[1].to_string(),
            service: parts[2].to_string(),
            region: parts[3].to_string(),
            account_id: parts[4].to_string(),
            resource: parts[5].to_string(),
        };
        if arn.partition.is_empty() || arn.service.is_empty() || arn.resource.is_empty() {
            return Err(ProviderError::Format(format!(
                "ARN {:?} is missing partition, service or resource",
                s
            )));
        }
        Ok(arn)
    }
}

impl fmt::Display for Arn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "arn:{}:{}:{}:{}:{}",
            self.partition, self.service, self.region, self.account_id, self.resource
        )
    }
}

/// How a resource kind builds and parses its identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityScheme {
    /// The value of one spec attribute.
    Simple {
        /// The attribute holding the name.
        field: String,
    },
    /// Several spec attributes joined by `separator`.
    Composite {
        /// The attributes, in encoding order. The first names the parent.
        fields: Vec<String>,
        /// The separator.
        separator: char,
    },
    /// A server-assigned id returned by create.
    Opaque {
        /// The computed attribute holding the id.
        field: String,
    },
    /// An ARN held in one attribute.
    Arn {
        /// The attribute holding the ARN.
        field: String,
    },
}

impl IdentityScheme {
    /// A simple scheme over `field`.
    pub fn simple(field: impl Into<String>) -> Self {
        Self::Simple {
            field: field.into(),
        }
    }

    /// A composite scheme over `fields`.
    pub fn composite<I, S>(fields: I, separator: char) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Composite {
            fields: fields.into_iter().map(Into::into).collect(),
            separator,
        }
    }

    /// An opaque scheme whose id lives in `field`.
    pub fn opaque(field: impl Into<String>) -> Self {
        Self::Opaque {
            field: field.into(),
        }
    }

    /// An ARN scheme over `field`.
    pub fn arn(field: impl Into<String>) -> Self {
        Self::Arn {
            field: field.into(),
        }
    }

    /// Whether the identity can be computed from the desired spec alone.
    pub fn derivable_from_spec(&self) -> bool {
        !matches!(self, Self::Opaque { .. })
    }

    /// The expected external format, for error messages.
    pub fn expected_format(&self) -> String {
        match self {
            Self::Simple { field } | Self::Opaque { field } => field.clone(),
            Self::Composite { fields, separator } => fields.join(&separator.to_string()),
            Self::Arn { .. } => "arn:partition:service:region:account:resource".to_string(),
        }
    }

    /// Parse an externally supplied identifier.
    ///
    /// Structure is validated here; no remote call is involved.
    pub fn decode(&self, raw: &str) -> Result<Identity, ProviderError> {
        match self {
            Self::Simple { .. } => non_empty(raw, self).map(Identity::Simple),
            Self::Opaque { .. } => non_empty(raw, self).map(Identity::Opaque),
            Self::Arn { .. } => raw.parse().map(Identity::Arn),
            Self::Composite { fields, separator } => {
                let parts: Vec<&str> = raw.split(*separator).collect();
                if parts.len() != fields.len() || parts.iter().any(|p| p.is_empty()) {
                    return Err(ProviderError::Format(format!(
                        "unexpected format for ID ({}), expected {}",
                        raw,
                        self.expected_format()
                    )));
                }
                Ok(Identity::Composite {
                    parts: parts.into_iter().map(str::to_string).collect(),
                    separator: *separator,
                })
            },
        }
    }

    /// Compute the identity from a desired spec and, when available, the
    /// attributes returned by the remote service.
    ///
    /// Spec attributes take precedence; remote attributes fill in the rest
    /// (always the case for opaque ids).
    pub fn derive(
        &self,
        spec: &Map<String, Value>,
        remote: Option<&Map<String, Value>>,
    ) -> Result<Identity, ProviderError> {
        let lookup = |field: &str| -> Result<String, ProviderError> {
            spec.get(field)
                .and_then(Value::as_str)
                .or_else(|| remote.and_then(|r| r.get(field)).and_then(Value::as_str))
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .ok_or_else(|| {
                    ProviderError::InvalidRequest(format!(
                        "cannot derive identity: attribute '{}' is not set",
                        field
                    ))
                })
        };

        match self {
            Self::Simple { field } => lookup(field.as_str()).map(Identity::Simple),
            Self::Opaque { field } => lookup(field.as_str()).map(Identity::Opaque),
            Self::Arn { field } => lookup(field.as_str())?.parse().map(Identity::Arn),
            Self::Composite { fields, separator } => {
                let parts = fields
                    .iter()
                    .map(|f| lookup(f.as_str()))
                    .collect::<Result<Vec<_>, _>>()?;
                if let Some(part) = parts.iter().find(|p| p.contains(*separator)) {
                    return Err(ProviderError::InvalidRequest(format!(
                        "cannot derive identity: {:?} contains the separator '{}'",
                        part, separator
                    )));
                }
                Ok(Identity::Composite {
                    parts,
                    separator: *separator,
                })
            },
        }
    }

    /// Map an identity back onto `(attribute, value)` pairs.
    pub fn fields(&self, identity: &Identity) -> Result<Vec<(String, String)>, ProviderError> {
        match (self, identity) {
            (Self::Simple { field }, Identity::Simple(v))
            | (Self::Opaque { field }, Identity::Opaque(v)) => Ok(vec![(field.clone(), v.clone())]),
            (Self::Arn { field }, Identity::Arn(arn)) => Ok(vec![(field.clone(), arn.to_string())]),
            (Self::Composite { fields, .. }, Identity::Composite { parts, .. })
                if fields.len() == parts.len() =>
            {
                Ok(fields.iter().cloned().zip(parts.iter().cloned()).collect())
            },
            _ => Err(ProviderError::Format(format!(
                "identity {} does not match the expected format {}",
                identity,
                self.expected_format()
            ))),
        }
    }
}

fn non_empty(raw: &str, scheme: &IdentityScheme) -> Result<String, ProviderError> {
    if raw.is_empty() {
        return Err(ProviderError::Format(format!(
            "empty ID, expected {}",
            scheme.expected_format()
        )));
    }
    Ok(raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn filter_scheme() -> IdentityScheme {
        IdentityScheme::composite(["log_group_name", "name"], ':')
    }

    #[test]
    fn test_decode_composite() {
        let id = filter_scheme().decode("app-logs:errors").unwrap();
        assert_eq!(
            id,
            Identity::Composite {
                parts: vec!["app-logs".to_string(), "errors".to_string()],
                separator: ':',
            }
        );
        assert_eq!(id.encode(), "app-logs:errors");
    }

    #[test]
    fn test_decode_rejects_wrong_separator_count() {
        for raw in ["app-logs", "a:b:c", ":errors", "app-logs:", ""] {
            let err = filter_scheme().decode(raw).unwrap_err();
            assert!(matches!(err, ProviderError::Format(_)), "{raw}: {err:?}");
        }
        let err = filter_scheme().decode("grp").unwrap_err();
        assert!(err.to_string().contains("log_group_name:name"));
    }

    #[test]
    fn test_decode_simple_and_opaque() {
        let simple = IdentityScheme::simple("policy_name");
        assert_eq!(simple.decode("p1").unwrap(), Identity::Simple("p1".to_string()));
        assert!(simple.decode("").is_err());

        let opaque = IdentityScheme::opaque("id");
        assert_eq!(
            opaque.decode("dlv-1234").unwrap(),
            Identity::Opaque("dlv-1234".to_string())
        );
    }

    #[test]
    fn test_arn_parse() {
        let arn: Arn = "arn:aws:logs:us-east-1:123456789012:destination:app"
            .parse()
            .unwrap();
        assert_eq!(arn.service, "logs");
        assert_eq!(arn.resource, "destination:app");
        assert_eq!(
            arn.to_string(),
            "arn:aws:logs:us-east-1:123456789012:destination:app"
        );

        assert!("arn:aws:logs".parse::<Arn>().is_err());
        assert!("urn:aws:logs:r:a:x".parse::<Arn>().is_err());
        assert!("arn::logs:r:a:x".parse::<Arn>().is_err());
    }

    #[test]
    fn test_derive_from_spec_and_remote() {
        let spec = json!({"log_group_name": "grp", "name": "f1"});
        let id = filter_scheme()
            .derive(spec.as_object().unwrap(), None)
            .unwrap();
        assert_eq!(id.encode(), "grp:f1");

        let opaque = IdentityScheme::opaque("id");
        assert!(opaque.derive(spec.as_object().unwrap(), None).is_err());

        let remote = json!({"id": "dlv-9"});
        let id = opaque
            .derive(spec.as_object().unwrap(), remote.as_object())
            .unwrap();
        assert_eq!(id, Identity::Opaque("dlv-9".to_string()));
    }

    #[test]
    fn test_derive_rejects_separator_in_part() {
        let spec = json!({"log_group_name": "a:b", "name": "f1"});
        assert!(filter_scheme()
            .derive(spec.as_object().unwrap(), None)
            .is_err());
    }

    #[test]
    fn test_fields_maps_back() {
        let id = filter_scheme().decode("grp:f1").unwrap();
        assert_eq!(
            filter_scheme().fields(&id).unwrap(),
            vec![
                ("log_group_name".to_string(), "grp".to_string()),
                ("name".to_string(), "f1".to_string()),
            ]
        );
        assert!(IdentityScheme::simple("name").fields(&id).is_err());
    }

    proptest! {
        #[test]
        fn composite_round_trip(
            parts in prop::collection::vec("[A-Za-z0-9/._#-]{1,24}", 2..=2),
            pipe in any::<bool>(),
        ) {
            let separator = if pipe { '|' } else { ':' };
            let scheme = IdentityScheme::composite(["log_group_name", "name"], separator);
            let id = Identity::Composite { parts, separator };
            prop_assert_eq!(scheme.decode(&id.encode()).unwrap(), id);
        }

        #[test]
        fn simple_round_trip(name in "[^\\s]{1,64}") {
            let scheme = IdentityScheme::simple("name");
            let id = Identity::Simple(name);
            prop_assert_eq!(scheme.decode(&id.encode()).unwrap(), id);
        }

        #[test]
        fn arn_round_trip(
            region in "[a-z0-9-]{0,12}",
            account in "[0-9]{0,12}",
            resource in "[a-z:/*_-]{1,32}",
        ) {
            let scheme = IdentityScheme::arn("arn");
            let id = Identity::Arn(Arn {
                partition: "aws".to_string(),
                service: "logs".to_string(),
                region,
                account_id: account,
                resource,
            });
            prop_assert_eq!(scheme.decode(&id.encode()).unwrap(), id);
        }
    }
}
