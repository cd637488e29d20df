// SPDX-License-Identifier: CEPL-1.0
use tilelint_core::MessageCode;

/// On/off switch for every message code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toggles {
    enabled: [bool; MessageCode::COUNT],
}

impl Default for Toggles {
    fn default() -> Self {
        let mut enabled = [false; MessageCode::COUNT];
        for code in MessageCode::ALL {
            enabled[code.index()] = code.enabled_by_default();
        }
        Self { enabled }
    }
}

impl Toggles {
    pub fn is_enabled(&self, code: MessageCode) -> bool {
        self.enabled[code.index()]
    }

    pub fn set(&mut self, code: MessageCode, on: bool) {
        self.enabled[code.index()] = on;
    }

    pub fn iter(&self) -> impl Iterator<Item = (MessageCode, bool)> + '_ {
        MessageCode::ALL.iter().map(|&c| (c, self.enabled[c.index()]))
    }
}
