use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

pub const CUSTOM_SLOTS: usize = 3;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomSlot {
    pub label: String,
    pub enabled: bool,
}

/// Operator-defined extra columns (e.g. delivered anesthetic, stimulus on/off).
///
/// Slots cascade: slot 2 can only be enabled while slot 1 is, slot 3 only while
/// slot 2 is. Disabling a slot disables every later slot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomFields {
    slots: [CustomSlot; CUSTOM_SLOTS],
}

impl CustomFields {
    pub fn slots(&self) -> &[CustomSlot; CUSTOM_SLOTS] {
        &self.slots
    }

    /// Enable or disable the zero-based `slot`.
    pub fn set_enabled(&mut self, slot: usize, enabled: bool) -> Result<()> {
        if slot >= CUSTOM_SLOTS {
            bail!("custom slot {} out of range (1..={CUSTOM_SLOTS})", slot + 1);
        }
        if enabled {
            if slot > 0 && !self.slots[slot - 1].enabled {
                bail!(
                    "custom value {} requires custom value {} to be enabled first",
                    slot + 1,
                    slot
                );
            }
            self.slots[slot].enabled = true;
        } else {
            for later in &mut self.slots[slot..] {
                later.enabled = false;
            }
        }
        Ok(())
    }

    pub fn set_label(&mut self, slot: usize, label: &str) -> Result<()> {
        let Some(entry) = self.slots.get_mut(slot) else {
            bail!("custom slot {} out of range (1..={CUSTOM_SLOTS})", slot + 1);
        };
        entry.label = label.to_string();
        Ok(())
    }

    /// Number of leading enabled slots. A slot enabled out of cascade order
    /// (only possible in a hand-edited settings file) is not counted.
    pub fn enabled_count(&self) -> usize {
        self.slots.iter().take_while(|slot| slot.enabled).count()
    }

    /// Column names for the enabled slots; spaces are not allowed in the log.
    pub fn column_labels(&self) -> Vec<String> {
        self.slots[..self.enabled_count()]
            .iter()
            .map(|slot| strip_spaces(&slot.label))
            .collect()
    }

    /// Drop any slot that violates the cascade.
    pub fn normalized(mut self) -> Self {
        let count = self.enabled_count();
        for slot in &mut self.slots[count..] {
            slot.enabled = false;
        }
        self
    }
}

pub fn strip_spaces(value: &str) -> String {
    value.chars().filter(|c| *c != ' ').collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn third_slot_requires_second() {
        let mut fields = CustomFields::default();
        fields.set_enabled(0, true).unwrap();
        assert!(fields.set_enabled(2, true).is_err());
        assert!(!fields.slots()[2].enabled);
    }

    #[test]
    fn enabling_in_order_succeeds() {
        let mut fields = CustomFields::default();
        for slot in 0..CUSTOM_SLOTS {
            fields.set_enabled(slot, true).unwrap();
        }
        assert_eq!(fields.enabled_count(), 3);
    }

    #[test]
    fn second_slot_requires_first() {
        let mut fields = CustomFields::default();
        assert!(fields.set_enabled(1, true).is_err());
        assert_eq!(fields.enabled_count(), 0);
    }

    #[test]
    fn disabling_cascades_forward() {
        let mut fields = CustomFields::default();
        for slot in 0..CUSTOM_SLOTS {
            fields.set_enabled(slot, true).unwrap();
        }
        fields.set_enabled(0, false).unwrap();
        assert!(fields.slots().iter().all(|slot| !slot.enabled));
    }

    #[test]
    fn labels_lose_spaces() {
        let mut fields = CustomFields::default();
        fields.set_label(0, "Iso Set %").unwrap();
        fields.set_enabled(0, true).unwrap();
        assert_eq!(fields.column_labels(), vec!["IsoSet%".to_string()]);
    }
}
