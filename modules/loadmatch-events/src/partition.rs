/// Stable partition for a key: 32-bit FNV-1a of its bytes, modulo the count.
///
/// The hash must not change between releases or processes, so std's
/// randomly seeded hasher is not usable here.
pub fn partition_for(key: &str, partitions: i32) -> i32 {
    if partitions <= 1 {
        return 0;
    }
    let mut hash: u32 = 0x811c_9dc5;
    for byte in key.as_bytes() {
        hash ^= u32::from(*byte);
        hash = hash.wrapping_mul(0x0100_0193);
    }
    (hash % partitions as u32) as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_key_same_partition() {
        assert_eq!(partition_for("LOAD-17", 8), partition_for("LOAD-17", 8));
    }

    #[test]
    fn known_vector() {
        // FNV-1a("a") = 0xe40c292c
        assert_eq!(partition_for("a", 1_000), (0xe40c_292c_u32 % 1_000) as i32);
    }

    #[test]
    fn stays_in_range() {
        for i in 0..200 {
            let p = partition_for(&format!("V{i}"), 8);
            assert!((0..8).contains(&p));
        }
        assert_eq!(partition_for("anything", 0), 0);
    }
}
