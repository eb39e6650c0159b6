// SDR white level query via the Windows DisplayConfig API.
//
// Tone mapping needs the brightness the desktop composer assigns to SDR
// white on a given monitor. DisplayConfig exposes that per display target;
// the monitor handle is matched to its target through the GDI device name
// its source reports.

use windows::Win32::Devices::Display::{
    DisplayConfigGetDeviceInfo, GetDisplayConfigBufferSizes, QueryDisplayConfig,
    DISPLAYCONFIG_DEVICE_INFO_GET_SDR_WHITE_LEVEL, DISPLAYCONFIG_DEVICE_INFO_GET_SOURCE_NAME,
    DISPLAYCONFIG_DEVICE_INFO_HEADER, DISPLAYCONFIG_DEVICE_INFO_TYPE, DISPLAYCONFIG_MODE_INFO,
    DISPLAYCONFIG_PATH_INFO, DISPLAYCONFIG_SDR_WHITE_LEVEL, DISPLAYCONFIG_SOURCE_DEVICE_NAME,
    QDC_ONLY_ACTIVE_PATHS,
};
use windows::Win32::Foundation::{ERROR_SUCCESS, LUID, POINT};
use windows::Win32::Graphics::Gdi::{
    GetMonitorInfoW, MonitorFromPoint, HMONITOR, MONITORINFOEXW, MONITOR_DEFAULTTOPRIMARY,
};

/// Default SDR white level in nits — the scRGB reference white. Falling back
/// to it makes the normalization scale 1.0, which is correct for SDR desktops.
pub const DEFAULT_SDR_WHITE_NITS: f32 = 80.0;

/// The primary monitor (the one paper-white is queried for at each
/// tone-mapping run).
pub fn primary_monitor() -> HMONITOR {
    // SAFETY: MonitorFromPoint with DEFAULTTOPRIMARY always returns a valid
    // handle as long as any monitor is attached.
    unsafe { MonitorFromPoint(POINT { x: 0, y: 0 }, MONITOR_DEFAULTTOPRIMARY) }
}

/// Query the SDR white level (nits) for the given monitor.
///
/// Falls back to `DEFAULT_SDR_WHITE_NITS` (80.0) when any step fails or the
/// reported level is non-positive (older Windows, non-HDR monitor, API
/// error).
pub fn query_sdr_white_level(monitor: HMONITOR) -> f32 {
    match white_level_nits(monitor) {
        Some(nits) if nits > 0.0 => nits,
        _ => DEFAULT_SDR_WHITE_NITS,
    }
}

/// Walk the active display paths once and read the SDR white level of the
/// target whose source drives `monitor`.
fn white_level_nits(monitor: HMONITOR) -> Option<f32> {
    let wanted = gdi_device_name(monitor)?;

    // SAFETY: both config queries fill buffers sized from the returned
    // counts; every DisplayConfigGetDeviceInfo call below gets a fully
    // initialized header.
    unsafe {
        let (mut n_paths, mut n_modes) = (0u32, 0u32);
        if GetDisplayConfigBufferSizes(QDC_ONLY_ACTIVE_PATHS, &mut n_paths, &mut n_modes)
            != ERROR_SUCCESS
        {
            return None;
        }

        let mut paths = vec![DISPLAYCONFIG_PATH_INFO::default(); n_paths as usize];
        let mut modes = vec![DISPLAYCONFIG_MODE_INFO::default(); n_modes as usize];
        if QueryDisplayConfig(
            QDC_ONLY_ACTIVE_PATHS,
            &mut n_paths,
            paths.as_mut_ptr(),
            &mut n_modes,
            modes.as_mut_ptr(),
            None,
        ) != ERROR_SUCCESS
        {
            return None;
        }

        paths.iter().take(n_paths as usize).find_map(|path| {
            // Source side: which GDI device does this path drive?
            let mut source = DISPLAYCONFIG_SOURCE_DEVICE_NAME {
                header: info_header::<DISPLAYCONFIG_SOURCE_DEVICE_NAME>(
                    DISPLAYCONFIG_DEVICE_INFO_GET_SOURCE_NAME,
                    path.sourceInfo.adapterId,
                    path.sourceInfo.id,
                ),
                ..Default::default()
            };
            if DisplayConfigGetDeviceInfo(&mut source.header) != 0
                || utf16_until_nul(&source.viewGdiDeviceName) != wanted
            {
                return None;
            }

            // Target side: SDR white level, reported as 80-nit multiples
            // scaled by 1000.
            let mut level = DISPLAYCONFIG_SDR_WHITE_LEVEL {
                header: info_header::<DISPLAYCONFIG_SDR_WHITE_LEVEL>(
                    DISPLAYCONFIG_DEVICE_INFO_GET_SDR_WHITE_LEVEL,
                    path.targetInfo.adapterId,
                    path.targetInfo.id,
                ),
                SDRWhiteLevel: 0,
            };
            if DisplayConfigGetDeviceInfo(&mut level.header) != 0 {
                return None;
            }

            Some(level.SDRWhiteLevel as f32 / 1000.0 * 80.0)
        })
    }
}

/// Request header for a DisplayConfig device-info query of type `T`.
fn info_header<T>(
    kind: DISPLAYCONFIG_DEVICE_INFO_TYPE,
    adapter_id: LUID,
    id: u32,
) -> DISPLAYCONFIG_DEVICE_INFO_HEADER {
    DISPLAYCONFIG_DEVICE_INFO_HEADER {
        r#type: kind,
        size: std::mem::size_of::<T>() as u32,
        adapterId: adapter_id,
        id,
    }
}

/// GDI device name (e.g. `\\.\DISPLAY1`) of a monitor handle.
fn gdi_device_name(monitor: HMONITOR) -> Option<String> {
    // SAFETY: cbSize is set before the call; the struct is stack-owned.
    unsafe {
        let mut info = MONITORINFOEXW::default();
        info.monitorInfo.cbSize = std::mem::size_of::<MONITORINFOEXW>() as u32;
        GetMonitorInfoW(monitor, &mut info.monitorInfo)
            .as_bool()
            .then(|| utf16_until_nul(&info.szDevice))
            .filter(|name| !name.is_empty())
    }
}

fn utf16_until_nul(raw: &[u16]) -> String {
    let len = raw.iter().position(|&c| c == 0).unwrap_or(raw.len());
    String::from_utf16_lossy(&raw[..len])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utf16_until_nul_stops_at_terminator() {
        let raw: Vec<u16> = "\\\\.\\DISPLAY1\0garbage".encode_utf16().collect();
        assert_eq!(utf16_until_nul(&raw), "\\\\.\\DISPLAY1");
    }

    #[test]
    fn test_primary_monitor_device_name() {
        let name = gdi_device_name(primary_monitor()).expect("no device name");
        println!("Primary monitor device: {}", name);
        assert!(name.starts_with("\\\\.\\DISPLAY"));
    }

    #[test]
    fn test_query_sdr_white_level_primary() {
        let nits = query_sdr_white_level(primary_monitor());
        println!("Primary monitor SDR white level: {} nits", nits);
        // Reasonable range: 80-480 nits (the Windows slider range), with the
        // 80-nit fallback below it.
        assert!(
            (40.0..=600.0).contains(&nits),
            "SDR white level {} nits is outside expected range",
            nits
        );
    }
}
