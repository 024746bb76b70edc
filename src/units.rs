/*
 *  Copyright (C) 2025 Michael Bachmann
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU Affero General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU Affero General Public License for more details.
 *
 *  You should have received a copy of the GNU Affero General Public License
 *  along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

//! Fixtures (C11). A fixed set of seven physical units, created once
//! from configuration and owned by the FX layer; their state is
//! serialized into a [`DataMsg`] once per render tick.

use crate::config::UnitsConfig;
use serde::{Deserialize, Serialize};

pub mod name {
    pub const AC_POWER: &str = "ac power";
    pub const MAIN_PINSPOT: &str = "main pinspot";
    pub const FILL_PINSPOT: &str = "fill pinspot";
    pub const EL_ENTRY: &str = "el entry";
    pub const EL_DANCE: &str = "el dance";
    pub const LED_FOREST: &str = "led forest";
    pub const DISCO_BALL: &str = "disco ball";
}

pub mod unit_type {
    pub const PINSPOT: &str = "pinspot";
    pub const DIMMABLE: &str = "dimmable";
    pub const SWITCH: &str = "switch";
}

/// RGB + white + brightness, the per-tick state a pinspot renders.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Color {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
    pub white: u8,
    pub brightness: u8,
}

/// One physical fixture: a name, a DMX start address, and whichever
/// state it currently holds (color for pinspots, a 0..=255 level for
/// dimmables/switches).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Unit {
    pub name: &'static str,
    pub unit_type: &'static str,
    pub address: u16,
    pub color: Color,
    pub level: u8,
}

impl Unit {
    fn new(name: &'static str, unit_type: &'static str, address: u16) -> Self {
        Unit {
            name,
            unit_type,
            address,
            color: Color::default(),
            level: 0,
        }
    }

    pub fn dark(&mut self) {
        self.color = Color::default();
        self.level = 0;
    }
}

/// The fixed set of seven fixtures, addresses taken from configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Units {
    pub main_pinspot: Unit,
    pub fill_pinspot: Unit,
    pub el_entry: Unit,
    pub el_dance: Unit,
    pub led_forest: Unit,
    pub disco_ball: Unit,
    pub ac_power: Unit,
}

impl Units {
    pub fn from_config(cfg: &UnitsConfig) -> Self {
        Units {
            main_pinspot: Unit::new(name::MAIN_PINSPOT, unit_type::PINSPOT, cfg.main_pinspot.address),
            fill_pinspot: Unit::new(name::FILL_PINSPOT, unit_type::PINSPOT, cfg.fill_pinspot.address),
            el_entry: Unit::new(name::EL_ENTRY, unit_type::DIMMABLE, cfg.el_entry.address),
            el_dance: Unit::new(name::EL_DANCE, unit_type::DIMMABLE, cfg.el_dance.address),
            led_forest: Unit::new(name::LED_FOREST, unit_type::DIMMABLE, cfg.led_forest.address),
            disco_ball: Unit::new(name::DISCO_BALL, unit_type::DIMMABLE, cfg.disco_ball.address),
            ac_power: Unit::new(name::AC_POWER, unit_type::SWITCH, cfg.ac_power.address),
        }
    }

    pub fn all_dark(&mut self) {
        for unit in self.iter_mut() {
            unit.dark();
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Unit> {
        [
            &self.main_pinspot,
            &self.fill_pinspot,
            &self.el_entry,
            &self.el_dance,
            &self.led_forest,
            &self.disco_ball,
            &self.ac_power,
        ]
        .into_iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Unit> {
        [
            &mut self.main_pinspot,
            &mut self.fill_pinspot,
            &mut self.el_entry,
            &mut self.el_dance,
            &mut self.led_forest,
            &mut self.disco_ball,
            &mut self.ac_power,
        ]
        .into_iter()
    }

    /// Assembles the per-tick [`DataMsg`] from current fixture state.
    pub fn to_data_msg(&self) -> DataMsg {
        DataMsg {
            fixtures: self.iter().map(|u| (u.address, u.clone())).collect(),
        }
    }
}

/// Fixed schema sent to the light controller once per tick: a
/// destination-channel map plus the per-fixture byte blocks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataMsg {
    pub fixtures: Vec<(u16, Unit)>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UnitsConfig;

    #[test]
    fn from_config_assigns_configured_addresses() {
        let units = Units::from_config(&UnitsConfig::default());
        assert_eq!(units.main_pinspot.address, 1);
        assert_eq!(units.ac_power.address, 13);
    }

    #[test]
    fn all_dark_zeroes_every_fixture() {
        let mut units = Units::from_config(&UnitsConfig::default());
        units.main_pinspot.color = Color {
            red: 255,
            green: 0,
            blue: 0,
            white: 0,
            brightness: 255,
        };
        units.all_dark();
        assert_eq!(units.main_pinspot.color.red, 0);
        assert_eq!(units.main_pinspot.level, 0);
    }

    #[test]
    fn data_msg_carries_all_seven_fixtures() {
        let units = Units::from_config(&UnitsConfig::default());
        let msg = units.to_data_msg();
        assert_eq!(msg.fixtures.len(), 7);
    }
}
