#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(slice) = combined_energy::models::ReadingsSlice::from_slice(data) {
        let _ = slice.by_device();
        for device in &slice.devices {
            let _ = device.numeric_series();
        }
    }
});
