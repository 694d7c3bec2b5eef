#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use crate::cipher::AesEcb;
    use crate::pairing::derive_pairing_key;
    use crate::utils::constant_time_compare;

    proptest! {
        #[test]
        fn test_key_derivation_determinism(
            salt in any::<[u8; 16]>(),
            pin in "[0-9]{4}",
        ) {
            prop_assert_eq!(derive_pairing_key(&salt, &pin), derive_pairing_key(&salt, &pin));
        }

        #[test]
        fn test_distinct_pins_distinct_keys(
            salt in any::<[u8; 16]>(),
            a in "[0-9]{4}",
            b in "[0-9]{4}",
        ) {
            prop_assume!(a != b);
            prop_assert_ne!(derive_pairing_key(&salt, &a), derive_pairing_key(&salt, &b));
        }

        #[test]
        fn test_ecb_inverts_for_whole_blocks(
            key in any::<[u8; 16]>(),
            blocks in 1usize..4,
            fill in any::<u8>(),
        ) {
            let cipher = AesEcb::new(key);
            let plain = vec![fill; blocks * 16];
            let ct = cipher.encrypt(&plain).unwrap();
            prop_assert_eq!(ct.len(), plain.len());
            prop_assert_eq!(cipher.decrypt(&ct).unwrap(), plain);
        }

        #[test]
        fn test_ecb_rejects_partial_blocks(len in 1usize..64) {
            prop_assume!(len % 16 != 0);
            let cipher = AesEcb::new([0u8; 16]);
            prop_assert!(cipher.decrypt(&vec![0u8; len]).is_err());
        }

        #[test]
        fn test_constant_time_compare_agrees_with_eq(
            a in any::<Vec<u8>>(),
            b in any::<Vec<u8>>(),
        ) {
            prop_assert_eq!(constant_time_compare(&a, &b), a == b);
        }
    }
}
