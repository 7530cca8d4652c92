//! Host flash partition table
//!
//! Parses `pflash -i` output so the factory-reset sequence can discover
//! which partitions to erase on the running hardware generation instead of
//! hard-coding a list.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// One partition entry from the flash tool's listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PnorPartition {
    /// Partition name (`NVRAM`, `GUARD`, ...)
    pub name: String,
    /// Partition carries ECC and must be cleared with an ECC-aware erase
    pub ecc: bool,
    /// Partition is flagged for clearing on reprovision
    pub reprovision: bool,
}

impl PnorPartition {
    /// Flash tool flag selecting the right clear operation.
    pub fn clear_flag(&self) -> &'static str {
        if self.ecc { "-c" } else { "-e" }
    }
}

fn part_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // ID=06 MVPD 0x0012d000..0x001bd000 (actual=0x00090000) [E--P--F-C-]
        Regex::new(r"^ID=\d+\s+(\S+)\s.*\[([^\]]+)\]$").expect("valid partition pattern")
    })
}

/// Parse the flash tool's partition listing.
///
/// Flag `F` marks a partition for clearing on reprovision; `E` or `C`
/// means the clear must go through the ECC-aware path.
pub fn parse_partition_table(info: &str) -> Vec<PnorPartition> {
    let mut parts = Vec::new();
    for line in info.lines() {
        let Some(caps) = part_line().captures(line.trim()) else {
            continue;
        };
        let flags = &caps[2];
        parts.push(PnorPartition {
            name: caps[1].to_string(),
            ecc: flags.contains('E') || flags.contains('C'),
            reprovision: flags.contains('F'),
        });
    }
    parts
}

/// Partitions the factory-reset sequence must clear.
pub fn parts_to_clear(info: &str) -> Vec<PnorPartition> {
    parse_partition_table(info)
        .into_iter()
        .filter(|p| p.reprovision)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
ID=00 part 0x00000000..0x00002000 (actual=0x00002000) [p----R----]
ID=05 NVRAM 0x00085000..0x000c5000 (actual=0x00040000) [----P-F---]
ID=06 MVPD 0x0012d000..0x001bd000 (actual=0x00090000) [E--P--F-C-]
ID=07 HBEL 0x001bd000..0x001cd000 (actual=0x00010000) [E-----F-C-]
ID=08 BOOTKERNEL 0x00205000..0x01205000 (actual=0x01000000) [----P-----]
garbage line without brackets
";

    #[test]
    fn test_parse_partition_table_reads_flags() {
        let parts = parse_partition_table(SAMPLE);
        assert_eq!(parts.len(), 5);
        assert_eq!(parts[0].name, "part");
        assert!(!parts[0].reprovision);
        assert_eq!(parts[2].name, "MVPD");
        assert!(parts[2].ecc);
        assert!(parts[2].reprovision);
    }

    #[test]
    fn test_parts_to_clear_filters_reprovision_flag() {
        let parts = parts_to_clear(SAMPLE);
        let names: Vec<&str> = parts.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["NVRAM", "MVPD", "HBEL"]);
    }

    #[test]
    fn test_clear_flag_selects_ecc_path() {
        let parts = parts_to_clear(SAMPLE);
        assert_eq!(parts[0].clear_flag(), "-e"); // NVRAM, plain
        assert_eq!(parts[1].clear_flag(), "-c"); // MVPD, ECC
    }

    #[test]
    fn test_empty_listing_yields_no_partitions() {
        assert!(parts_to_clear("").is_empty());
        assert!(parts_to_clear("no table here\n").is_empty());
    }
}
