//! Integration tests for the elementwise kernel set
//!
//! Launch sizing is exercised on a CPU device with a deliberately small grid
//! so the capacity boundary is reachable.

use feedfwd_core::{ops, Device, DeviceConfig, Error, Result};

const BLOCK: u32 = 256;

fn small_grid_device(max_grid_dim_x: u32) -> Result<Device> {
    Device::open(&DeviceConfig {
        cpu_max_grid_dim_x: max_grid_dim_x,
        ..DeviceConfig::default()
    })
}

// ============================================================================
// set_const_val
// ============================================================================

#[test]
fn test_set_const_val_boundary_lengths() -> Result<()> {
    let device = small_grid_device(4)?;
    let capacity = device.properties().max_tasks_1d(BLOCK);
    assert_eq!(capacity, 1024);

    for lx in [1, 256, 257, capacity] {
        let mut out = device.allocate::<f32>(lx)?;
        ops::memory::set_const_val(&device, lx, 3.25, &mut out, BLOCK)?;
        let values = out.to_vec()?;
        assert_eq!(values.len(), lx);
        assert!(values.iter().all(|&v| v == 3.25), "lx = {lx}");
    }
    Ok(())
}

#[test]
fn test_set_const_val_over_capacity() -> Result<()> {
    let device = small_grid_device(4)?;
    let mut out = device.allocate::<f32>(1025)?;

    match ops::memory::set_const_val(&device, 1025, 1.0, &mut out, BLOCK) {
        Err(Error::CapacityExceeded { requested, capacity }) => {
            assert_eq!(requested, 1025);
            assert_eq!(capacity, 1024);
        }
        other => panic!("expected CapacityExceeded, got {other:?}"),
    }

    // A larger block covers the same length within the grid limit
    ops::memory::set_const_val(&device, 1025, 1.0, &mut out, 512)?;
    assert!(out.to_vec()?.iter().all(|&v| v == 1.0));
    Ok(())
}

#[test]
fn test_set_const_val_default_grid_large_array() -> Result<()> {
    let device = Device::new()?;
    let lx = 1 << 20;
    let mut out = device.allocate::<f32>(lx)?;
    ops::memory::set_const_val(&device, lx, -0.5, &mut out, BLOCK)?;
    let values = out.to_vec()?;
    assert_eq!(values[0], -0.5);
    assert_eq!(values[lx - 1], -0.5);
    Ok(())
}

// ============================================================================
// hadamard_multiply
// ============================================================================

#[test]
fn test_hadamard_with_ones_is_identity() -> Result<()> {
    let device = Device::new()?;
    let n = 1000;
    let data: Vec<f32> = (0..n).map(|i| (i as f32 * 0.37).sin()).collect();

    let mut ones = device.allocate::<f32>(n)?;
    ops::memory::set_const_val(&device, n, 1.0, &mut ones, BLOCK)?;
    let mut b = device.upload(&data)?;
    ops::math::hadamard_multiply(&device, n, &ones, &mut b, BLOCK)?;

    assert_eq!(b.to_vec()?, data);
    Ok(())
}

// ============================================================================
// cross-entropy
// ============================================================================

#[test]
fn test_cost_xent_matching_prediction_is_finite() -> Result<()> {
    let device = Device::new()?;
    let p: Vec<f32> = (1..100).map(|i| i as f32 / 100.0).collect();
    let y_hat = device.upload(&p)?;
    let y = device.upload(&p)?;
    let mut out = device.allocate::<f32>(p.len())?;

    ops::loss::cost_xent(&device, p.len(), &y_hat, &y, &mut out, BLOCK)?;
    for value in out.to_vec()? {
        assert!(value.is_finite());
        assert!(value >= 0.0);
    }
    Ok(())
}

#[test]
fn test_cost_xent_extremes_are_not_clamped() -> Result<()> {
    let device = Device::new()?;
    let y_hat = device.upload(&[0.0f32, 1.0, 0.0, 1.0])?;
    let y = device.upload(&[1.0f32, 0.0, 0.0, 1.0])?;
    let mut out = device.allocate::<f32>(4)?;

    ops::loss::cost_xent(&device, 4, &y_hat, &y, &mut out, BLOCK)?;
    let values = out.to_vec()?;
    assert_eq!(values[0], f32::INFINITY);
    assert_eq!(values[1], f32::INFINITY);
    assert!(values[2].is_nan());
    assert!(values[3].is_nan());
    Ok(())
}

#[test]
fn test_delta_xent_extremes_are_not_clamped() -> Result<()> {
    let device = Device::new()?;
    let y_hat = device.upload(&[0.0f32, 1.0])?;
    let y = device.upload(&[1.0f32, 0.0])?;
    let mut out = device.allocate::<f32>(2)?;

    ops::loss::delta_xent(&device, 2, &y_hat, &y, &mut out, BLOCK)?;
    assert!(out.to_vec()?.iter().all(|v| !v.is_finite()));
    Ok(())
}

#[test]
fn test_kernels_reject_oversized_block() -> Result<()> {
    let device = Device::new()?;
    let mut out = device.allocate::<f32>(8)?;
    let too_big = device.properties().max_threads_per_block + 1;
    assert!(matches!(
        ops::memory::set_const_val(&device, 8, 1.0, &mut out, too_big),
        Err(Error::InvalidLaunch(_))
    ));
    Ok(())
}

// ============================================================================
// Device ownership
// ============================================================================

#[test]
fn test_operands_must_share_the_launching_device() -> Result<()> {
    let device_a = Device::new()?;
    let device_b = Device::new()?;
    let ones = device_a.upload(&[1.0f32; 3])?;
    let mut on_b = device_b.upload(&[4.0f32, 5.0, 6.0])?;
    let unrelated = device_a.upload(&[7.0f32; 3])?;

    // Operand from A, in-place target on B: rejected on either device
    assert!(matches!(
        ops::math::hadamard_multiply(&device_b, 3, &ones, &mut on_b, BLOCK),
        Err(Error::InvalidLaunch(_))
    ));
    assert!(matches!(
        ops::math::hadamard_multiply(&device_a, 3, &ones, &mut on_b, BLOCK),
        Err(Error::InvalidLaunch(_))
    ));

    assert_eq!(on_b.to_vec()?, vec![4.0, 5.0, 6.0]);
    assert_eq!(unrelated.to_vec()?, vec![7.0; 3]);

    // A clone of the device shares its backend
    let device_b_clone = device_b.clone();
    assert!(on_b.is_on(&device_b_clone));
    let b_ones = device_b_clone.upload(&[2.0f32; 3])?;
    ops::math::hadamard_multiply(&device_b_clone, 3, &b_ones, &mut on_b, BLOCK)?;
    assert_eq!(on_b.to_vec()?, vec![8.0, 10.0, 12.0]);
    Ok(())
}
