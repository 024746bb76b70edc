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

//! `_airplay._tcp` / `_raop._tcp` advertisement. The TXT key order
//! is fixed and enumerated rather than left to map iteration order, so a
//! byte-for-byte capture of a real Pierre advertisement can be diffed
//! against this crate's output.

use std::collections::BTreeMap;

pub const SERVICE_AIRPLAY: &str = "_airplay._tcp";
pub const SERVICE_RAOP: &str = "_raop._tcp";

/// TXT record keys, in AirPlay's required advertisement order. This
/// order is preserved here (rather than alphabetized) because it is
/// the order callers are expected to serialize them in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TxtKey {
    ApFeatures,
    MdFeatures,
    PlFeatures,
    PublicKey,
    ApGroupDiscoverableLeader,
    ApGroupUuid,
    ApAirPlayPairingIdentity,
    ApAirPlayVsn,
    ApSerialNumber,
    ApManufacturer,
    ApModel,
    FirmwareVsn,
    ApSystemFlags,
    ApProtocolVsn,
    ApRequiredSenderFeatures,
    ApDeviceId,
    ApAccessControlLevel,
    MdAirPlayVsn,
    MdAirTunesProtocolVsn,
    MdSystemFlags,
    MdModel,
    MdMetadataTypes,
    MdEncryptTypes,
    MdDigestAuthKey,
    MdCompressionTypes,
    MdTransportTypes,
    ApServiceName,
}

impl TxtKey {
    /// The exact wire key spelling (`apFeatures`, `mdFeatures`, ...).
    pub const fn as_str(self) -> &'static str {
        match self {
            TxtKey::ApFeatures => "apFeatures",
            TxtKey::MdFeatures => "mdFeatures",
            TxtKey::PlFeatures => "plFeatures",
            TxtKey::PublicKey => "PublicKey",
            TxtKey::ApGroupDiscoverableLeader => "apGroupDiscoverableLeader",
            TxtKey::ApGroupUuid => "apGroupUUID",
            TxtKey::ApAirPlayPairingIdentity => "apAirPlayPairingIdentity",
            TxtKey::ApAirPlayVsn => "apAirPlayVsn",
            TxtKey::ApSerialNumber => "apSerialNumber",
            TxtKey::ApManufacturer => "apManufacturer",
            TxtKey::ApModel => "apModel",
            TxtKey::FirmwareVsn => "FirmwareVsn",
            TxtKey::ApSystemFlags => "apSystemFlags",
            TxtKey::ApProtocolVsn => "apProtocolVsn",
            TxtKey::ApRequiredSenderFeatures => "apRequiredSenderFeatures",
            TxtKey::ApDeviceId => "apDeviceID",
            TxtKey::ApAccessControlLevel => "apAccessControlLevel",
            TxtKey::MdAirPlayVsn => "mdAirPlayVsn",
            TxtKey::MdAirTunesProtocolVsn => "mdAirTunesProtocolVsn",
            TxtKey::MdSystemFlags => "mdSystemFlags",
            TxtKey::MdModel => "mdModel",
            TxtKey::MdMetadataTypes => "mdMetadataTypes",
            TxtKey::MdEncryptTypes => "mdEncryptTypes",
            TxtKey::MdDigestAuthKey => "mdDigestAuthKey",
            TxtKey::MdCompressionTypes => "mdCompressionTypes",
            TxtKey::MdTransportTypes => "mdTransportTypes",
            TxtKey::ApServiceName => "apServiceName",
        }
    }

    /// All keys, in the required advertisement order.
    pub const ORDER: [TxtKey; 27] = [
        TxtKey::ApFeatures,
        TxtKey::MdFeatures,
        TxtKey::PlFeatures,
        TxtKey::PublicKey,
        TxtKey::ApGroupDiscoverableLeader,
        TxtKey::ApGroupUuid,
        TxtKey::ApAirPlayPairingIdentity,
        TxtKey::ApAirPlayVsn,
        TxtKey::ApSerialNumber,
        TxtKey::ApManufacturer,
        TxtKey::ApModel,
        TxtKey::FirmwareVsn,
        TxtKey::ApSystemFlags,
        TxtKey::ApProtocolVsn,
        TxtKey::ApRequiredSenderFeatures,
        TxtKey::ApDeviceId,
        TxtKey::ApAccessControlLevel,
        TxtKey::MdAirPlayVsn,
        TxtKey::MdAirTunesProtocolVsn,
        TxtKey::MdSystemFlags,
        TxtKey::MdModel,
        TxtKey::MdMetadataTypes,
        TxtKey::MdEncryptTypes,
        TxtKey::MdDigestAuthKey,
        TxtKey::MdCompressionTypes,
        TxtKey::MdTransportTypes,
        TxtKey::ApServiceName,
    ];
}

/// Builds the ordered TXT record set for an advertisement. Callers fill
/// in whichever of `values` they have real data for; keys missing from
/// the map are simply omitted from the advertised record, in order.
pub fn build_txt_record(values: &BTreeMap<TxtKey, String>) -> Vec<(&'static str, String)> {
    TxtKey::ORDER
        .iter()
        .filter_map(|key| values.get(key).map(|v| (key.as_str(), v.clone())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn txt_keys_match_expected_wire_spelling() {
        assert_eq!(TxtKey::ApDeviceId.as_str(), "apDeviceID");
        assert_eq!(TxtKey::ApGroupUuid.as_str(), "apGroupUUID");
        assert_eq!(TxtKey::MdTransportTypes.as_str(), "mdTransportTypes");
    }

    #[test]
    fn build_txt_record_preserves_declaration_order() {
        let mut values = BTreeMap::new();
        values.insert(TxtKey::ApModel, "Pierre".to_owned());
        values.insert(TxtKey::ApFeatures, "0x1".to_owned());
        values.insert(TxtKey::ApServiceName, "pierre".to_owned());

        let record = build_txt_record(&values);
        let keys: Vec<&str> = record.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec!["apFeatures", "apModel", "apServiceName"]);
    }
}
