// title/commonkeys.rs from wadkit (c) 2025 NinjaCheetah & Contributors
//
// Implements the table of common keys used to wrap Title Keys.

use crate::title::config::ConfigError;

const COMMON_KEY: [u8; 16] = [0xeb, 0xe4, 0x2a, 0x22, 0x5e, 0x85, 0x93, 0xe4, 0x48, 0xd9, 0xc5, 0x45, 0x73, 0x81, 0xaa, 0xf7];
const KOREAN_KEY: [u8; 16] = [0x63, 0xb8, 0x2b, 0xb4, 0xf4, 0x61, 0x4e, 0x2e, 0x13, 0xf2, 0xfe, 0xfb, 0xba, 0x4c, 0x9b, 0x7e];
const VWII_KEY: [u8; 16] = [0x30, 0xbf, 0xc7, 0x6e, 0x7c, 0x19, 0xaf, 0xbb, 0x23, 0x16, 0x33, 0x30, 0xce, 0xd7, 0xc2, 0x8d];
const DEV_COMMON_KEY: [u8; 16] = [0xa1, 0x60, 0x4a, 0x6a, 0x71, 0x23, 0xb5, 0x29, 0xae, 0x8b, 0xec, 0x32, 0xc8, 0x16, 0xfc, 0xaa];

/// The three common keys a Ticket can select with its common key index. Index 0 is the common
/// key, index 1 is the Korean key, and index 2 is the vWii key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommonKeys {
    keys: [[u8; 16]; 3],
}

impl CommonKeys {
    pub fn new(keys: [[u8; 16]; 3]) -> Self {
        CommonKeys { keys }
    }

    /// Creates a new CommonKeys table from three hex strings, in index order.
    pub fn from_hex(keys: [&str; 3]) -> Result<Self, ConfigError> {
        let mut table = [[0u8; 16]; 3];
        for (index, key) in keys.iter().enumerate() {
            table[index] = hex::decode(key)
                .ok()
                .and_then(|bytes| <[u8; 16]>::try_from(bytes).ok())
                .ok_or(ConfigError::InvalidCommonKey(index))?;
        }
        Ok(CommonKeys { keys: table })
    }

    /// Gets the keys used by retail consoles.
    pub fn retail() -> Self {
        CommonKeys { keys: [COMMON_KEY, KOREAN_KEY, VWII_KEY] }
    }

    /// Gets the keys used by development consoles. Only index 0 differs from retail.
    pub fn development() -> Self {
        CommonKeys { keys: [DEV_COMMON_KEY, KOREAN_KEY, VWII_KEY] }
    }

    /// Gets the common key for the specified index, or None if the index isn't 0, 1, or 2.
    pub fn get(&self, index: u8) -> Option<[u8; 16]> {
        self.keys.get(index as usize).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_common_key() {
        assert_eq!(CommonKeys::retail().get(0), Some([0xeb, 0xe4, 0x2a, 0x22, 0x5e, 0x85, 0x93, 0xe4, 0x48, 0xd9, 0xc5, 0x45, 0x73, 0x81, 0xaa, 0xf7]));
    }
    #[test]
    fn test_get_invalid_index() {
        assert_eq!(CommonKeys::retail().get(3), None);
        assert_eq!(CommonKeys::retail().get(57), None);
    }
    #[test]
    fn test_get_korean_key() {
        assert_eq!(CommonKeys::retail().get(1), Some([0x63, 0xb8, 0x2b, 0xb4, 0xf4, 0x61, 0x4e, 0x2e, 0x13, 0xf2, 0xfe, 0xfb, 0xba, 0x4c, 0x9b, 0x7e]));
    }
    #[test]
    fn test_get_vwii_key() {
        assert_eq!(CommonKeys::retail().get(2), Some([0x30, 0xbf, 0xc7, 0x6e, 0x7c, 0x19, 0xaf, 0xbb, 0x23, 0x16, 0x33, 0x30, 0xce, 0xd7, 0xc2, 0x8d]));
    }
    #[test]
    fn test_get_dev_key() {
        assert_eq!(CommonKeys::development().get(0), Some([0xa1, 0x60, 0x4a, 0x6a, 0x71, 0x23, 0xb5, 0x29, 0xae, 0x8b, 0xec, 0x32, 0xc8, 0x16, 0xfc, 0xaa]));
        assert_eq!(CommonKeys::development().get(1), CommonKeys::retail().get(1));
    }
    #[test]
    fn test_from_hex_rejects_bad_keys() {
        let common = "ebe42a225e8593e448d9c5457381aaf7";
        let korean = "63b82bb4f4614e2e13f2fefbba4c9b7e";
        let vwii = "30bfc76e7c19afbb23163330ced7c28d";
        assert!(matches!(CommonKeys::from_hex([common, "zz", vwii]), Err(ConfigError::InvalidCommonKey(1))));
        assert!(matches!(CommonKeys::from_hex([common, korean, "00"]), Err(ConfigError::InvalidCommonKey(2))));
        assert_eq!(CommonKeys::from_hex([common, korean, vwii]).unwrap(), CommonKeys::retail());
    }
    #[test]
    fn test_development_keys_from_hex() {
        let dev = CommonKeys::development();
        let keys = [0, 1, 2].map(|index| hex::encode(dev.get(index).unwrap()));
        assert_eq!(keys[0], "a1604a6a7123b529ae8bec32c816fcaa");
        assert_eq!(CommonKeys::from_hex([&keys[0], &keys[1], &keys[2]]).unwrap(), dev);
    }
}
