//! DXGI desktop-duplication session over the primary output.
//!
//! # Threading model
//!
//! `AcquireNextFrame` blocks for at most the caller's timeout (the worker
//! passes 100 ms), so cancellation is observed promptly between calls.
//! The GPU surface is copied into a CPU-readable staging texture and read
//! back row by row honoring the driver's row pitch.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, info};
use windows::{
    core::Interface,
    Win32::Graphics::{
        Direct3D::D3D_DRIVER_TYPE_HARDWARE,
        Direct3D11::{
            D3D11CreateDevice, ID3D11Device, ID3D11DeviceContext, ID3D11Texture2D,
            D3D11_BIND_FLAG, D3D11_CPU_ACCESS_READ, D3D11_CREATE_DEVICE_BGRA_SUPPORT,
            D3D11_MAP_READ, D3D11_RESOURCE_MISC_FLAG, D3D11_SDK_VERSION, D3D11_TEXTURE2D_DESC,
            D3D11_USAGE_STAGING,
        },
        Dxgi::{
            Common::{DXGI_FORMAT, DXGI_FORMAT_R16G16B16A16_FLOAT, DXGI_SAMPLE_DESC},
            IDXGIAdapter, IDXGIDevice, IDXGIOutput1, IDXGIOutputDuplication, IDXGIResource,
            DXGI_ERROR_ACCESS_LOST, DXGI_ERROR_WAIT_TIMEOUT, DXGI_OUTDUPL_DESC,
            DXGI_OUTDUPL_FRAME_INFO,
        },
    },
};

use hindsight_core::CaptureError;

use crate::tonemap;
use crate::{FrameSource, SourceFrame};

pub struct DuplicationSource {
    device: ID3D11Device,
    context: ID3D11DeviceContext,
    duplication: IDXGIOutputDuplication,
    staging: Option<ID3D11Texture2D>,
    width: u32,
    height: u32,
    /// Primary output scans out FP16: read in source format and tone-map.
    hdr: bool,
    tonemap_scratch: Vec<u8>,
}

// The D3D11 device is created without D3D11_CREATE_DEVICE_SINGLETHREADED
// and only this worker touches the session.
unsafe impl Send for DuplicationSource {}

impl DuplicationSource {
    /// Open a duplication session on the primary output of the default
    /// adapter.
    pub fn new() -> Result<Self, CaptureError> {
        let mut device: Option<ID3D11Device> = None;
        let mut context: Option<ID3D11DeviceContext> = None;
        unsafe {
            D3D11CreateDevice(
                None,
                D3D_DRIVER_TYPE_HARDWARE,
                None,
                D3D11_CREATE_DEVICE_BGRA_SUPPORT,
                None,
                D3D11_SDK_VERSION,
                Some(&mut device),
                None,
                Some(&mut context),
            )
        }
        .map_err(|e| init_err("D3D11CreateDevice", e))?;
        let device = device.ok_or_else(|| CaptureError::Init {
            reason: "D3D11CreateDevice returned no device".into(),
        })?;
        let context = context.ok_or_else(|| CaptureError::Init {
            reason: "D3D11CreateDevice returned no context".into(),
        })?;

        let dxgi_device: IDXGIDevice = device
            .cast()
            .map_err(|e| init_err("cast IDXGIDevice", e))?;
        let adapter: IDXGIAdapter =
            unsafe { dxgi_device.GetAdapter() }.map_err(|e| init_err("GetAdapter", e))?;
        // Primary output only.
        let output = unsafe { adapter.EnumOutputs(0) }.map_err(|e| init_err("EnumOutputs", e))?;
        let output1: IDXGIOutput1 = output
            .cast()
            .map_err(|e| init_err("cast IDXGIOutput1", e))?;
        let duplication = unsafe { output1.DuplicateOutput(&device) }
            .map_err(|e| init_err("DuplicateOutput", e))?;

        let mut desc = DXGI_OUTDUPL_DESC::default();
        unsafe { duplication.GetDesc(&mut desc) };
        let width = desc.ModeDesc.Width;
        let height = desc.ModeDesc.Height;
        let hdr = desc.ModeDesc.Format == DXGI_FORMAT_R16G16B16A16_FLOAT;

        info!(
            "duplication session on primary output: {width}x{height}, format {:?}{}",
            desc.ModeDesc.Format,
            if hdr { " (HDR, CPU tone map active)" } else { "" }
        );

        Ok(Self {
            device,
            context,
            duplication,
            staging: None,
            width,
            height,
            hdr,
            tonemap_scratch: Vec::new(),
        })
    }

    fn bytes_per_pixel(&self) -> usize {
        if self.hdr {
            8
        } else {
            4
        }
    }

    /// Staging texture in the *source* format — for HDR outputs this is
    /// the FP16 shadow resource the tone map reads from.
    fn ensure_staging(&mut self, format: DXGI_FORMAT) -> Result<ID3D11Texture2D, CaptureError> {
        if let Some(staging) = &self.staging {
            return Ok(staging.clone());
        }
        let desc = D3D11_TEXTURE2D_DESC {
            Width: self.width,
            Height: self.height,
            MipLevels: 1,
            ArraySize: 1,
            Format: format,
            SampleDesc: DXGI_SAMPLE_DESC {
                Count: 1,
                Quality: 0,
            },
            Usage: D3D11_USAGE_STAGING,
            BindFlags: D3D11_BIND_FLAG(0).0 as u32,
            CPUAccessFlags: D3D11_CPU_ACCESS_READ.0 as u32,
            MiscFlags: D3D11_RESOURCE_MISC_FLAG(0).0 as u32,
        };
        let mut texture: Option<ID3D11Texture2D> = None;
        unsafe { self.device.CreateTexture2D(&desc, None, Some(&mut texture)) }
            .map_err(|e| unexpected_err("CreateTexture2D staging", e))?;
        let texture = texture.ok_or_else(|| CaptureError::Unexpected {
            reason: "CreateTexture2D returned no texture".into(),
        })?;
        debug!("staging texture created ({:?})", format);
        self.staging = Some(texture.clone());
        Ok(texture)
    }

    fn read_frame(&mut self, resource: IDXGIResource) -> Result<SourceFrame, CaptureError> {
        let gpu_texture: ID3D11Texture2D = resource
            .cast()
            .map_err(|e| unexpected_err("cast ID3D11Texture2D", e))?;

        let mut texture_desc = D3D11_TEXTURE2D_DESC::default();
        unsafe { gpu_texture.GetDesc(&mut texture_desc) };
        let staging = self.ensure_staging(texture_desc.Format)?;

        unsafe { self.context.CopyResource(&staging, &gpu_texture) };
        // The duplication frame can be released as soon as the copy is
        // queued; holding it starves the compositor.
        unsafe { self.duplication.ReleaseFrame() }
            .map_err(|e| unexpected_err("ReleaseFrame", e))?;

        let mapped = unsafe {
            let mut mapped = Default::default();
            self.context
                .Map(&staging, 0, D3D11_MAP_READ, 0, Some(&mut mapped))
                .map_err(|e| unexpected_err("Map staging", e))?;
            mapped
        };

        let bpp = self.bytes_per_pixel();
        let row_bytes = self.width as usize * bpp;
        let row_pitch = mapped.RowPitch as usize;
        let mut raw = Vec::with_capacity(row_bytes * self.height as usize);
        for row in 0..self.height as usize {
            let src = unsafe {
                std::slice::from_raw_parts(
                    (mapped.pData as *const u8).add(row * row_pitch),
                    row_bytes,
                )
            };
            raw.extend_from_slice(src);
        }
        unsafe { self.context.Unmap(&staging, 0) };

        let bgra = if self.hdr {
            let pixels = self.width as usize * self.height as usize;
            tonemap::map_f16_rgba_to_bgra8(&raw, pixels, &mut self.tonemap_scratch);
            Bytes::copy_from_slice(&self.tonemap_scratch)
        } else {
            Bytes::from(raw)
        };

        Ok(SourceFrame {
            data: bgra,
            width: self.width,
            height: self.height,
        })
    }
}

#[async_trait]
impl FrameSource for DuplicationSource {
    async fn acquire(&mut self, timeout: Duration) -> Result<SourceFrame, CaptureError> {
        let mut frame_info = DXGI_OUTDUPL_FRAME_INFO::default();
        let mut resource: Option<IDXGIResource> = None;

        let acquired = unsafe {
            self.duplication.AcquireNextFrame(
                timeout.as_millis() as u32,
                &mut frame_info,
                &mut resource,
            )
        };

        if let Err(err) = acquired {
            return Err(match err.code() {
                code if code == DXGI_ERROR_WAIT_TIMEOUT => CaptureError::WaitTimeout,
                code if code == DXGI_ERROR_ACCESS_LOST => CaptureError::AccessLost {
                    reason: err.message().to_string(),
                },
                _ => CaptureError::Unexpected {
                    reason: format!("AcquireNextFrame: {err}"),
                },
            });
        }

        let Some(resource) = resource else {
            let _ = unsafe { self.duplication.ReleaseFrame() };
            return Err(CaptureError::WaitTimeout);
        };

        self.read_frame(resource)
    }
}

impl Drop for DuplicationSource {
    fn drop(&mut self) {
        debug!("duplication session released");
    }
}

fn init_err(stage: &str, err: windows::core::Error) -> CaptureError {
    CaptureError::Init {
        reason: format!("{stage}: {err}"),
    }
}

fn unexpected_err(stage: &str, err: windows::core::Error) -> CaptureError {
    CaptureError::Unexpected {
        reason: format!("{stage}: {err}"),
    }
}
