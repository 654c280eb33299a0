//! # Channel State
//!
//! Outbound RC channel values in pulse-width microseconds, plus the work
//! mode that tells upstream producers which of them owns the channels.

use std::fmt;
use std::str::FromStr;

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};

use crate::crsf::protocol::{CHANNEL_US_CENTER, CHANNEL_US_MAX, CHANNEL_US_MIN, CRSF_NUM_CHANNELS};
use crate::error::{CrsfLinkError, Result};

/// 16 channel values, each 1000-2000 µs; channel N lives at index N-1
pub type ChannelVector = [u16; CRSF_NUM_CHANNELS];

/// Which upstream producer is authoritative for the channel values
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkMode {
    Joystick,
    #[default]
    Manual,
}

impl WorkMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkMode::Joystick => "joystick",
            WorkMode::Manual => "manual",
        }
    }

    pub(crate) fn to_u8(self) -> u8 {
        match self {
            WorkMode::Joystick => 0,
            WorkMode::Manual => 1,
        }
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        if value == 0 { WorkMode::Joystick } else { WorkMode::Manual }
    }
}

impl fmt::Display for WorkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkMode {
    type Err = CrsfLinkError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "joystick" => Ok(WorkMode::Joystick),
            "manual" => Ok(WorkMode::Manual),
            other => Err(CrsfLinkError::InvalidWorkMode(other.to_string())),
        }
    }
}

fn in_range(value: u16) -> bool {
    (CHANNEL_US_MIN..=CHANNEL_US_MAX).contains(&value)
}

/// Outbound channel values shared between the API caller and the transmit path
///
/// Every update swaps in a whole new vector, so the transmit path never
/// encodes a half-applied update.
#[derive(Debug)]
pub struct ChannelStore {
    values: ArcSwap<ChannelVector>,
}

impl Default for ChannelStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelStore {
    /// All channels centered at 1500 µs
    pub fn new() -> Self {
        Self {
            values: ArcSwap::from_pointee([CHANNEL_US_CENTER; CRSF_NUM_CHANNELS]),
        }
    }

    /// Set one channel (1-16) to a value in 1000-2000
    ///
    /// # Errors
    ///
    /// `ChannelOutOfRange` or `ValueOutOfRange`; nothing is changed
    pub fn set(&self, channel: usize, value: u16) -> Result<()> {
        if !(1..=CRSF_NUM_CHANNELS).contains(&channel) {
            return Err(CrsfLinkError::ChannelOutOfRange { channel: channel as i64 });
        }
        if !in_range(value) {
            return Err(CrsfLinkError::ValueOutOfRange {
                channel: channel as i64,
                value: i64::from(value),
            });
        }

        self.values.rcu(|current| {
            let mut next = **current;
            next[channel - 1] = value;
            next
        });
        Ok(())
    }

    /// Replace all 16 channels at once
    ///
    /// # Errors
    ///
    /// `ChannelCount` unless exactly 16 values are given, `InvalidChannelValue`
    /// if any is out of range; nothing is changed
    pub fn set_all(&self, values: &[u16]) -> Result<()> {
        let next: ChannelVector = values.try_into().map_err(|_| CrsfLinkError::ChannelCount {
            expected: CRSF_NUM_CHANNELS,
            actual: values.len(),
        })?;

        if let Some((index, &value)) = next.iter().enumerate().find(|(_, v)| !in_range(**v)) {
            return Err(CrsfLinkError::InvalidChannelValue {
                index,
                value: i64::from(value),
            });
        }

        self.values.store(next.into());
        Ok(())
    }

    /// Current channel vector
    pub fn get(&self) -> ChannelVector {
        **self.values.load()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_initial_values_centered() {
        assert_eq!(ChannelStore::new().get(), [1500; 16]);
    }

    #[test]
    fn test_set_every_channel_and_value_boundary() {
        let store = ChannelStore::new();
        for channel in 1..=16 {
            for value in [1000, 1234, 2000] {
                store.set(channel, value).unwrap();
                assert_eq!(store.get()[channel - 1], value);
            }
        }
    }

    #[test]
    fn test_set_rejects_bad_channel_without_mutation() {
        let store = ChannelStore::new();
        for channel in [0, 17, 100] {
            let err = store.set(channel, 1600).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Range);
        }
        assert_eq!(store.get(), [1500; 16]);
    }

    #[test]
    fn test_set_rejects_bad_value_without_mutation() {
        let store = ChannelStore::new();
        for value in [0, 999, 2001, u16::MAX] {
            let err = store.set(3, value).unwrap_err();
            assert!(matches!(err, CrsfLinkError::ValueOutOfRange { channel: 3, .. }));
        }
        assert_eq!(store.get(), [1500; 16]);
    }

    #[test]
    fn test_set_all_replaces_vector() {
        let store = ChannelStore::new();
        let values: Vec<u16> = (0..16).map(|i| 1000 + i * 50).collect();

        store.set_all(&values).unwrap();
        assert_eq!(store.get().to_vec(), values);
    }

    #[test]
    fn test_set_all_wrong_count() {
        let store = ChannelStore::new();
        for count in [0, 4, 15, 17] {
            let err = store.set_all(&vec![1200; count]).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Count);
        }
        assert_eq!(store.get(), [1500; 16]);
    }

    #[test]
    fn test_set_all_bad_value_is_all_or_nothing() {
        let store = ChannelStore::new();
        let mut values = vec![1900u16; 16];
        values[9] = 2500;

        match store.set_all(&values) {
            Err(CrsfLinkError::InvalidChannelValue { index, value }) => {
                assert_eq!(index, 9);
                assert_eq!(value, 2500);
            }
            other => panic!("Expected InvalidChannelValue, got {:?}", other),
        }
        assert_eq!(store.get(), [1500; 16]);
    }

    #[test]
    fn test_work_mode_parsing() {
        assert_eq!("joystick".parse::<WorkMode>().unwrap(), WorkMode::Joystick);
        assert_eq!("manual".parse::<WorkMode>().unwrap(), WorkMode::Manual);
        assert!(matches!(
            "autopilot".parse::<WorkMode>(),
            Err(CrsfLinkError::InvalidWorkMode(_))
        ));
        assert_eq!(WorkMode::Joystick.to_string(), "joystick");
        assert_eq!(WorkMode::from_u8(WorkMode::Joystick.to_u8()), WorkMode::Joystick);
        assert_eq!(WorkMode::from_u8(WorkMode::Manual.to_u8()), WorkMode::Manual);
    }
}
