use flash_core::*;

#[test]
fn families_are_well_formed() {
    for fam in [&STM32F401RE, &STM32L476RG] {
        assert!(fam.is_well_formed(), "{}", fam.name);
        let r = fam.default_region;
        assert_eq!(FlashRegion::new(fam, r.offset, r.size).unwrap(), r);
    }
    assert_eq!(STM32F401RE.total_size(), 512 * 1024);
    assert_eq!(STM32F401RE.unit_count(), 8);
    assert_eq!(STM32L476RG.total_size(), 1024 * 1024);
    assert_eq!(STM32L476RG.unit_count(), 512);
}

#[test]
fn f4_sector_table() {
    let cases = [
        (0x0800_0000, 0),
        (0x0800_3FFF, 0),
        (0x0800_4000, 1),
        (0x0800_C000, 3),
        (0x0801_0000, 4),
        (0x0801_FFFF, 4),
        (0x0802_0000, 5),
        (0x0804_0000, 6),
        (0x0806_0000, 7),
        (0x0807_FFFF, 7),
    ];
    for (addr, sector) in cases {
        assert_eq!(STM32F401RE.sector_of(addr).unwrap().index, sector, "{:#x}", addr);
    }
}

#[test]
fn boundary_belongs_to_unit_starting_there() {
    let u = STM32F401RE.sector_of(0x0801_0000).unwrap();
    assert_eq!(u, EraseUnit { index: 4, addr: 0x0801_0000, size: 64 * 1024 });

    let before = STM32F401RE.sector_of(0x0800_FFFF).unwrap();
    assert_eq!(before.index, 3);
    assert_eq!(before.addr_end(), u.addr);
}

#[test]
fn l4_pages_continue_across_banks() {
    let last_bank1 = STM32L476RG.sector_of(0x0807_FFFF).unwrap();
    assert_eq!(last_bank1.index, 255);
    let first_bank2 = STM32L476RG.sector_of(0x0808_0000).unwrap();
    assert_eq!(first_bank2, EraseUnit { index: 256, addr: 0x0808_0000, size: 2048 });
    assert_eq!(STM32L476RG.unit(511).unwrap().addr_end(), STM32L476RG.end_addr());
}

#[test]
fn sector_of_contains_address_and_is_stable() {
    for fam in [&STM32F401RE, &STM32L476RG] {
        let mut addr = fam.base_addr();
        while addr < fam.end_addr() {
            let u = fam.sector_of(addr).unwrap();
            assert!(u.contains_addr(addr));
            assert_eq!(fam.sector_of(addr).unwrap(), u);
            assert_eq!(fam.unit(u.index).unwrap(), u);
            addr += 0x3F1;
        }
    }
}

#[test]
fn out_of_family_is_rejected() {
    assert!(matches!(
        STM32F401RE.sector_of(0x07FF_FFFF),
        Err(FlashError::OutOfRange { .. })
    ));
    assert!(matches!(
        STM32F401RE.sector_of(STM32F401RE.end_addr()),
        Err(FlashError::OutOfRange { .. })
    ));
    assert!(STM32F401RE.unit(8).is_none());
}

#[test]
fn covering_units_spanning_unequal_sectors() {
    // last 4 KiB of sector 4 (64 KiB) and first 4 KiB of sector 5 (128 KiB)
    let (first, last) = STM32F401RE.units_covering(0x0801_F000, 0x2000).unwrap();
    assert_eq!((first.index, last.index), (4, 5));
    assert_eq!(first.size, 64 * 1024);
    assert_eq!(last.size, 128 * 1024);

    let (first, last) = STM32F401RE.units_covering(0x0804_0000, 128 * 1024).unwrap();
    assert_eq!((first.index, last.index), (6, 6));

    assert!(STM32F401RE.units_covering(0x0807_F000, 0x2000).is_err());
    assert!(matches!(
        STM32F401RE.units_covering(0x0800_0000, 0),
        Err(FlashError::InvalidArgument(_))
    ));
}

#[test]
fn region_must_sit_on_unit_boundaries() {
    assert!(FlashRegion::new(&STM32F401RE, 0x2_0000, 0x6_0000).is_ok());
    assert!(matches!(
        FlashRegion::new(&STM32F401RE, 0x4_0000, 0x1000),
        Err(FlashError::InvalidArgument(_))
    ));
    assert!(matches!(
        FlashRegion::new(&STM32F401RE, 0x6_0000, 0x4_0000),
        Err(FlashError::OutOfRange { .. })
    ));
    assert!(FlashRegion::new(&STM32L476RG, 0x800, 0x1000).is_ok());
}

#[test]
fn region_bounds() {
    let r = STM32F401RE.default_region;
    assert_eq!(r.base_addr(&STM32F401RE), 0x0804_0000);
    assert!(r.contains(0, r.size));
    assert!(!r.contains(r.size - 4, 8));
    assert!(!r.contains(u32::MAX, 2));
    assert_eq!(r.check(r.size, 1), Err(FlashError::OutOfRange { offset: r.size, len: 1 }));
}

#[test]
fn diagnostics_start_at_zero() {
    let mut d = Diagnostics::new();
    assert_eq!((d.read_count(), d.write_count(), d.error_count()), (0, 0, 0));
    d.record_read();
    d.record_error();
    assert_eq!((d.read_count(), d.write_count(), d.error_count()), (1, 0, 1));
}
