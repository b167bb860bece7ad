use std::fmt;

use blobway_core::hash;
use blobway_core::time;
use blobway_core::time::DateTime;
use blobway_core::Result;

/// The service SAS version the facade signs with.
/// https://learn.microsoft.com/en-us/rest/api/storageservices/create-service-sas
const SERVICE_SAS_VERSION: &str = "2018-11-09";

/// Permission flags a shared-access grant can carry.
///
/// Flags render in the canonical order the service expects (`racwdl`);
/// `list` only applies to container-scoped grants.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Permissions {
    /// Read object content and properties.
    pub read: bool,
    /// Append to an existing object.
    pub add: bool,
    /// Create a new object.
    pub create: bool,
    /// Write object content and properties.
    pub write: bool,
    /// Delete an object.
    pub delete: bool,
    /// List objects in the container (container scope only).
    pub list: bool,
}

impl Permissions {
    /// No permissions.
    pub const NONE: Self = Self {
        read: false,
        add: false,
        create: false,
        write: false,
        delete: false,
        list: false,
    };
    /// Read permission.
    pub const READ: Self = Self {
        read: true,
        ..Self::NONE
    };
    /// Add permission.
    pub const ADD: Self = Self {
        add: true,
        ..Self::NONE
    };
    /// Create permission.
    pub const CREATE: Self = Self {
        create: true,
        ..Self::NONE
    };
    /// Write permission.
    pub const WRITE: Self = Self {
        write: true,
        ..Self::NONE
    };
    /// Delete permission.
    pub const DELETE: Self = Self {
        delete: true,
        ..Self::NONE
    };
    /// List permission.
    pub const LIST: Self = Self {
        list: true,
        ..Self::NONE
    };
}

impl std::ops::BitOr for Permissions {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self {
            read: self.read || rhs.read,
            add: self.add || rhs.add,
            create: self.create || rhs.create,
            write: self.write || rhs.write,
            delete: self.delete || rhs.delete,
            list: self.list || rhs.list,
        }
    }
}

impl fmt::Display for Permissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Canonical service order.
        if self.read {
            f.write_str("r")?;
        }
        if self.add {
            f.write_str("a")?;
        }
        if self.create {
            f.write_str("c")?;
        }
        if self.write {
            f.write_str("w")?;
        }
        if self.delete {
            f.write_str("d")?;
        }
        if self.list {
            f.write_str("l")?;
        }
        Ok(())
    }
}

/// The resource scope a grant applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SasResource {
    /// The whole container.
    Container,
    /// A single object.
    Blob,
}

impl SasResource {
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            SasResource::Container => "c",
            SasResource::Blob => "b",
        }
    }
}

/// The authorization mode of a grant.
///
/// Exactly one mode applies per grant. An ad-hoc grant carries its
/// permissions and absolute expiry in the token itself; a stored-policy
/// grant carries only the policy identifier and leaves both to the
/// server-side policy definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SasAuthorization {
    /// Ad-hoc expiring grant.
    AdHoc {
        /// Granted permission set.
        permissions: Permissions,
        /// Absolute expiry timestamp.
        expires_on: DateTime,
    },
    /// Grant referencing a named access policy stored on the container.
    StoredPolicy {
        /// Stored access policy identifier.
        identifier: String,
    },
}

/// A service shared-access signature over one container or object.
pub(crate) struct ServiceSharedAccessSignature {
    account: String,
    key: String,
    resource: SasResource,
    canonicalized_resource: String,
    authorization: SasAuthorization,
    version: String,
}

impl ServiceSharedAccessSignature {
    pub fn new(
        account: String,
        key: String,
        resource: SasResource,
        canonicalized_resource: String,
        authorization: SasAuthorization,
    ) -> Self {
        Self {
            account,
            key,
            resource,
            canonicalized_resource,
            authorization,
            version: SERVICE_SAS_VERSION.to_string(),
        }
    }

    // String-to-sign layout for service SAS version 2018-11-09:
    // permissions, start, expiry, canonicalized resource, identifier, IP,
    // protocol, version, resource, snapshot time, then the five response
    // header overrides. Unused fields stay empty but keep their newline.
    fn signature(&self) -> Result<String> {
        let (permissions, expiry, identifier) = match &self.authorization {
            SasAuthorization::AdHoc {
                permissions,
                expires_on,
            } => (
                permissions.to_string(),
                time::format_rfc3339(*expires_on),
                String::new(),
            ),
            SasAuthorization::StoredPolicy { identifier } => {
                (String::new(), String::new(), identifier.clone())
            }
        };

        let string_to_sign = format!(
            "{}\n{}\n{}\n{}\n{}\n{}\n{}\n{}\n{}\n{}\n{}\n{}\n{}\n{}\n{}",
            permissions,
            "", // start
            expiry,
            self.canonicalized_resource,
            identifier,
            "", // IP range
            "", // protocol
            self.version,
            self.resource.as_str(),
            "", // snapshot time
            "", // rscc
            "", // rscd
            "", // rsce
            "", // rscl
            "", // rsct
        );

        let decode_content = hash::base64_decode(self.key.as_str())?;

        Ok(hash::base64_hmac_sha256(
            &decode_content,
            string_to_sign.as_bytes(),
        ))
    }

    /// Render the signed token as query pairs.
    pub fn token(&self) -> Result<Vec<(String, String)>> {
        let mut elements: Vec<(String, String)> = vec![
            ("sv".to_string(), self.version.to_string()),
            ("sr".to_string(), self.resource.as_str().to_string()),
        ];

        match &self.authorization {
            SasAuthorization::AdHoc {
                permissions,
                expires_on,
            } => {
                elements.push((
                    "se".to_string(),
                    urlencoded(time::format_rfc3339(*expires_on)),
                ));
                elements.push(("sp".to_string(), permissions.to_string()));
            }
            SasAuthorization::StoredPolicy { identifier } => {
                elements.push(("si".to_string(), urlencoded(identifier.clone())));
            }
        }

        let sig = self.signature()?;
        elements.push(("sig".to_string(), urlencoded(sig)));

        Ok(elements)
    }

    #[cfg(test)]
    pub fn account(&self) -> &str {
        &self.account
    }
}

fn urlencoded(s: String) -> String {
    form_urlencoded::byte_serialize(s.as_bytes()).collect()
}
