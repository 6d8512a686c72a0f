use thiserror::Error;

/// Number of opaque components a client device fingerprint must carry.
pub const DEVICE_ID_COMPONENTS: usize = 5;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Invalid device ID")]
pub struct InvalidDeviceId;

/// Opaque per-device key used to deduplicate download counts.
///
/// The component contents are never interpreted; only the arity is part of
/// the contract.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn from_components(components: &[String]) -> Result<Self, InvalidDeviceId> {
        if components.len() != DEVICE_ID_COMPONENTS {
            return Err(InvalidDeviceId);
        }
        Ok(Self(components.join("-")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn components(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("c{i}")).collect()
    }

    #[test]
    fn five_components_join_with_dashes() {
        let id = DeviceId::from_components(&components(5)).unwrap();
        assert_eq!(id.as_str(), "c0-c1-c2-c3-c4");
    }

    #[test]
    fn other_arities_are_rejected() {
        assert_eq!(
            DeviceId::from_components(&components(4)),
            Err(InvalidDeviceId)
        );
        assert_eq!(
            DeviceId::from_components(&components(6)),
            Err(InvalidDeviceId)
        );
        assert_eq!(DeviceId::from_components(&[]), Err(InvalidDeviceId));
    }
}
