// GUID arguments and generation

use bootgpt_core::PartitionType;
use log::debug;
use uguid::Guid;
use uuid::Uuid;

/// Parses `xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx`
pub fn parse_guid(s: &str) -> Result<Guid, String> {
    s.trim()
        .parse::<Guid>()
        .map_err(|err| format!("invalid GUID \"{s}\": {err}"))
}

/// Accepts a known type name or a literal type GUID
pub fn parse_type(s: &str) -> Result<Guid, String> {
    if let Some(partition_type) = PartitionType::from_name(s.trim()) {
        return Ok(partition_type.to_gpt_guid().0);
    }
    parse_guid(s).map_err(|_| {
        let names: Vec<&str> = PartitionType::named()
            .iter()
            .map(|t| t.type_name())
            .collect();
        format!(
            "unknown partition type \"{s}\" (expected a GUID or one of: {})",
            names.join(", ")
        )
    })
}

/// Random version 4 GUID, in the mixed-endian on-disk byte order
pub fn random_guid() -> Guid {
    let uuid = Uuid::new_v4();
    debug!("generated random GUID {}", uuid);
    Guid::from_bytes(uuid.to_bytes_le())
}
