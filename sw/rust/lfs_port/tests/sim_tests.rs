#![cfg(feature = "mock")]
use flash_core::{FlashError, FlashRegion, HardwareFault, STM32F401RE, STM32L476RG};
use flash_ll::TARGET_FAMILY;
use lfs_port::mock::*;
use lfs_port::*;

const MAGIC: &[u8; 8] = b"stampfs1";

/// Just enough of a filesystem to tell formatted flash from blank flash: a 16-byte
/// superblock at the start of block 0.
#[derive(Default)]
struct StampFs {
    mounts: u32,
    formats: u32,
}

fn superblock(cfg: &BlockDeviceConfig) -> [u8; 16] {
    let mut sb = [0u8; 16];
    sb[..8].copy_from_slice(MAGIC);
    sb[8..12].copy_from_slice(&cfg.block_count.to_le_bytes());
    sb[12..16].copy_from_slice(&cfg.block_size.to_le_bytes());
    sb
}

impl FilesystemEngine for StampFs {
    fn mount(&mut self, cfg: &BlockDeviceConfig) -> i32 {
        self.mounts += 1;
        let mut sb = [0u8; 16];
        let err = (cfg.read)(cfg, 0, 0, &mut sb);
        if err != 0 {
            return err;
        }
        if sb != superblock(cfg) {
            return LFS_ERR_CORRUPT;
        }
        0
    }

    fn format(&mut self, cfg: &BlockDeviceConfig) -> i32 {
        self.formats += 1;
        for block in 0..cfg.block_count {
            let err = (cfg.erase)(cfg, block);
            if err != 0 {
                return err;
            }
        }
        let err = (cfg.prog)(cfg, 0, 0, &superblock(cfg));
        if err != 0 {
            return err;
        }
        (cfg.sync)(cfg)
    }
}

/// Never finds a filesystem; formatting may or may not work.
struct BrokenFs {
    format_result: i32,
    mounts: u32,
    formats: u32,
}

impl FilesystemEngine for BrokenFs {
    fn mount(&mut self, _cfg: &BlockDeviceConfig) -> i32 {
        self.mounts += 1;
        LFS_ERR_CORRUPT
    }

    fn format(&mut self, _cfg: &BlockDeviceConfig) -> i32 {
        self.formats += 1;
        self.format_result
    }
}

fn region_base(cfg: &BlockDeviceConfig) -> u32 {
    cfg.with_fal(|fal| fal.region().base_addr(fal.family()))
}

#[test]
fn erase_then_format_then_mount() {
    let (flash, cfg) = new_mock().unwrap();
    flash.poke(region_base(&cfg) + 0x10, &[0u8; 32]);

    cfg.with_fal(|fal| erase_region(fal, 0, 256 * 1024)).unwrap();
    let base = region_base(&cfg);
    assert!(cfg.with_fal(|fal| fal.verify_erased(base, 256 * 1024)));

    let mut fs = StampFs::default();
    assert_eq!(fs.mount(&cfg), LFS_ERR_CORRUPT);
    assert_eq!(fs.format(&cfg), 0);
    assert_eq!(fs.mount(&cfg), 0);
    assert_eq!(cfg.diagnostics().error_count(), 0);
}

#[test]
fn mount_or_format_formats_once_then_mounts() {
    let (_flash, cfg) = new_mock().unwrap();
    cfg.with_fal(prepare_region).unwrap();

    let mut fs = StampFs::default();
    assert_eq!(mount_or_format(&mut fs, &cfg).unwrap(), MountOutcome::Formatted);
    assert_eq!((fs.mounts, fs.formats), (2, 1));

    let mut fs = StampFs::default();
    assert_eq!(mount_or_format(&mut fs, &cfg).unwrap(), MountOutcome::Mounted);
    assert_eq!((fs.mounts, fs.formats), (1, 0));
}

#[test]
fn mount_or_format_gives_up_after_one_cycle() {
    let (_flash, cfg) = new_mock().unwrap();

    let mut fs = BrokenFs { format_result: 0, mounts: 0, formats: 0 };
    assert!(matches!(
        mount_or_format(&mut fs, &cfg),
        Err(PortError::Mount(LFS_ERR_CORRUPT))
    ));
    assert_eq!((fs.mounts, fs.formats), (2, 1));

    let mut fs = BrokenFs { format_result: LFS_ERR_IO, mounts: 0, formats: 0 };
    assert!(matches!(mount_or_format(&mut fs, &cfg), Err(PortError::Format(LFS_ERR_IO))));
    assert_eq!((fs.mounts, fs.formats), (1, 1));
}

#[test]
fn prog_lands_at_block_times_block_size_plus_offset() {
    let (flash, cfg) = new_mock().unwrap();
    let data: Vec<u8> = (1..=16).collect();
    assert_eq!((cfg.prog)(&cfg, 1, 16, &data), 0);

    let addr = region_base(&cfg) + cfg.block_size + 16;
    assert_eq!(flash.snapshot(addr, 16), data);

    let mut out = [0u8; 16];
    assert_eq!((cfg.read)(&cfg, 1, 16, &mut out), 0);
    assert_eq!(&out[..], &data[..]);

    let d = cfg.diagnostics();
    assert_eq!((d.write_count(), d.read_count(), d.error_count()), (1, 1, 0));
}

#[test]
fn erase_shim_erases_exactly_one_block() {
    let (flash, cfg) = new_mock().unwrap();
    assert_eq!((cfg.erase)(&cfg, 1), 0);

    let first = TARGET_FAMILY.sector_of(region_base(&cfg) + cfg.block_size).unwrap();
    let last = TARGET_FAMILY.sector_of(region_base(&cfg) + 2 * cfg.block_size - 1).unwrap();
    let expected: Vec<u32> = (first.index..=last.index).collect();
    assert_eq!(flash.stats().erased_units, expected);
}

#[test]
fn failures_become_negative_codes() {
    let (flash, cfg) = new_mock().unwrap();
    let mut buf = [0u8; 8];

    // outside the block or the device
    assert_eq!((cfg.read)(&cfg, 0, cfg.block_size - 4, &mut buf), LFS_ERR_IO);
    assert_eq!((cfg.read)(&cfg, cfg.block_count, 0, &mut buf), LFS_ERR_IO);
    assert_eq!((cfg.erase)(&cfg, cfg.block_count), LFS_ERR_IO);
    assert!(flash.stats().erased_units.is_empty());

    // verification failure
    flash.set_stuck_high(0x80);
    assert_eq!((cfg.prog)(&cfg, 0, 0, &[0u8; 8]), LFS_ERR_IO);

    // hardware failure
    flash.set_stuck_high(0);
    let unit = TARGET_FAMILY.sector_of(region_base(&cfg)).unwrap();
    flash.fail_erase(unit.index);
    assert_eq!((cfg.erase)(&cfg, 0), LFS_ERR_IO);

    assert_eq!(cfg.diagnostics().error_count(), 2);
    assert_eq!((cfg.sync)(&cfg), 0);
}

#[test]
fn erase_region_reports_hardware_failure() {
    let (flash, cfg) = new_mock().unwrap();
    let last = TARGET_FAMILY
        .sector_of(region_base(&cfg) + cfg.with_fal(|fal| fal.region().size) - 1)
        .unwrap();
    flash.fail_erase(last.index);
    let err = cfg.with_fal(prepare_region).unwrap_err();
    assert!(matches!(
        err,
        PortError::Flash(FlashError::Hardware(HardwareFault::Operation))
    ));
}

#[test]
fn default_geometry_per_family() {
    let f4 = PortConfig::for_family(&STM32F401RE, STM32F401RE.default_region).unwrap();
    assert_eq!((f4.prog_size, f4.block_size, f4.block_count), (1, 128 * 1024, 2));

    let l4 = PortConfig::for_family(&STM32L476RG, STM32L476RG.default_region).unwrap();
    assert_eq!((l4.prog_size, l4.block_size, l4.block_count), (8, 2048, 128));
}

#[test]
fn geometry_must_match_family() {
    let region = STM32F401RE.default_region;
    let good = PortConfig::for_family(&STM32F401RE, region).unwrap();
    assert!(good.validate(&STM32F401RE, region).is_ok());

    let bad = [
        PortConfig { prog_size: 8, ..good },
        PortConfig { read_size: 0, ..good },
        // smaller than a 128 KiB sector
        PortConfig { block_size: 1024, block_count: 256, ..good },
        PortConfig { block_count: 3, ..good },
        PortConfig { cache_size: 100, ..good },
        PortConfig { lookahead_size: 12, ..good },
    ];
    for cfg in bad {
        assert!(
            matches!(cfg.validate(&STM32F401RE, region), Err(PortError::Config(_))),
            "{:?}",
            cfg
        );
    }
}

#[test]
fn mixed_sector_region_needs_matching_blocks() {
    // sectors 4..=7: 64 KiB then 3 x 128 KiB
    let region = FlashRegion::new(&STM32F401RE, 0x1_0000, 0x7_0000).unwrap();
    assert!(PortConfig::for_family(&STM32F401RE, region).is_err());

    // sectors 1..=3, all 16 KiB
    let region = FlashRegion::new(&STM32F401RE, 0x4000, 0xC000).unwrap();
    let cfg = PortConfig::for_family(&STM32F401RE, region).unwrap();
    assert_eq!((cfg.block_size, cfg.block_count), (16 * 1024, 3));
}

#[test]
fn custom_region_port() {
    if TARGET_FAMILY != &STM32F401RE {
        return;
    }
    let region = FlashRegion::new(&STM32F401RE, 0x4000, 0xC000).unwrap();
    let port = PortConfig::for_family(&STM32F401RE, region).unwrap();
    let (flash, cfg) = new_mock_with(region, port).unwrap();
    assert_eq!((cfg.erase)(&cfg, 2), 0);
    assert_eq!(flash.stats().erased_units, vec![3]);

    let mut fs = StampFs::default();
    assert_eq!(mount_or_format(&mut fs, &cfg).unwrap(), MountOutcome::Formatted);
}

#[test]
fn port_feature_selects_target_family() {
    #[cfg(feature = "stm32f4")]
    assert_eq!(TARGET_FAMILY.name, STM32F401RE.name);
    #[cfg(all(feature = "stm32l4", not(feature = "stm32f4")))]
    assert_eq!(TARGET_FAMILY.name, STM32L476RG.name);
}

#[test]
fn nested_flash_call_is_refused() {
    let (flash, cfg) = new_mock().unwrap();
    let mut buf = [0u8; 16];
    let codes = cfg.with_fal(|_fal| {
        ((cfg.read)(&cfg, 0, 0, &mut buf), (cfg.erase)(&cfg, 0), (cfg.sync)(&cfg))
    });
    assert_eq!(codes, (LFS_ERR_IO, LFS_ERR_IO, LFS_ERR_IO));
    assert!(flash.stats().erased_units.is_empty());
    // the refusal never reached the layer
    assert_eq!(cfg.diagnostics(), Default::default());
}
