use ffmpeg_next::format::context::Input;
use ffmpeg_next::software::scaling;
use ffmpeg_next::util::frame::video::Video;

use crate::capture::domain::camera_id::CameraId;
use crate::capture::domain::capture_device::{CaptureDevice, CaptureError, CaptureRequest};
use crate::shared::frame::Frame;

/// Linux video4linux2 demuxer, as named by libavdevice.
const V4L2_FORMAT: &str = "video4linux2,v4l2";

/// Live capture via ffmpeg-next (libavdevice for local cameras,
/// libavformat for network streams).
///
/// Decoded frames are converted to RGB24. The scaler is rebuilt when the
/// stream changes resolution mid-session.
pub struct FfmpegCapture {
    session: Option<Session>,
}

struct Session {
    input: Input,
    decoder: ffmpeg_next::decoder::Video,
    scaler: Option<ScalerState>,
    stream_index: usize,
    frame_index: usize,
    eof: bool,
}

struct ScalerState {
    context: scaling::Context,
    format: ffmpeg_next::format::Pixel,
    width: u32,
    height: u32,
}

// Safety: FfmpegCapture is owned by a single capture loop at a time.
// The raw pointers inside ffmpeg types are never shared across threads.
unsafe impl Send for FfmpegCapture {}

impl FfmpegCapture {
    pub fn new() -> Self {
        Self { session: None }
    }
}

impl Default for FfmpegCapture {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureDevice for FfmpegCapture {
    fn open(&mut self, camera: &CameraId, request: &CaptureRequest) -> Result<(), CaptureError> {
        self.release();
        let open_err = |reason: String| CaptureError::Open {
            camera: camera.to_string(),
            reason,
        };

        ffmpeg_next::init().map_err(|e| open_err(e.to_string()))?;
        let input = open_input(camera, request).map_err(|e| open_err(e.to_string()))?;

        let stream = input
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .ok_or_else(|| open_err("no video stream found".into()))?;
        let stream_index = stream.index();
        let codec_ctx = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())
            .map_err(|e| open_err(e.to_string()))?;
        let decoder = codec_ctx
            .decoder()
            .video()
            .map_err(|e| open_err(e.to_string()))?;

        log::debug!(
            "Opened {camera}: {}x{} {:?}",
            decoder.width(),
            decoder.height(),
            decoder.format()
        );

        self.session = Some(Session {
            input,
            decoder,
            scaler: None,
            stream_index,
            frame_index: 0,
            eof: false,
        });
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.session.as_ref().is_some_and(|s| !s.eof)
    }

    fn read(&mut self) -> Result<Frame, CaptureError> {
        let session = self.session.as_mut().ok_or(CaptureError::NotOpen)?;
        session.next_frame()
    }

    fn release(&mut self) {
        self.session = None;
    }
}

impl Session {
    fn next_frame(&mut self) -> Result<Frame, CaptureError> {
        if self.eof {
            return Err(CaptureError::EndOfStream);
        }
        loop {
            let mut decoded = Video::empty();
            if self.decoder.receive_frame(&mut decoded).is_ok() {
                return self.convert(&decoded);
            }

            let Some((stream, packet)) = self.input.packets().next() else {
                self.eof = true;
                return Err(CaptureError::EndOfStream);
            };
            if stream.index() != self.stream_index {
                continue;
            }
            self.decoder
                .send_packet(&packet)
                .map_err(|e| CaptureError::Decode(e.to_string()))?;
        }
    }

    fn convert(&mut self, decoded: &Video) -> Result<Frame, CaptureError> {
        let (width, height, format) = (decoded.width(), decoded.height(), decoded.format());
        let stale = self
            .scaler
            .as_ref()
            .map_or(true, |s| s.width != width || s.height != height || s.format != format);
        if stale {
            let context = scaling::Context::get(
                format,
                width,
                height,
                ffmpeg_next::format::Pixel::RGB24,
                width,
                height,
                scaling::Flags::BILINEAR,
            )
            .map_err(|e| CaptureError::Decode(e.to_string()))?;
            self.scaler = Some(ScalerState {
                context,
                format,
                width,
                height,
            });
        }
        let scaler = self
            .scaler
            .as_mut()
            .ok_or_else(|| CaptureError::Decode("scaler unavailable".into()))?;

        let mut rgb = Video::empty();
        scaler
            .context
            .run(decoded, &mut rgb)
            .map_err(|e| CaptureError::Decode(e.to_string()))?;

        let frame = Frame::new(
            packed_rgb(&rgb, width, height),
            width,
            height,
            3,
            self.frame_index,
        );
        self.frame_index += 1;
        Ok(frame)
    }
}

fn open_input(camera: &CameraId, request: &CaptureRequest) -> Result<Input, ffmpeg_next::Error> {
    let mut options = ffmpeg_next::Dictionary::new();
    match camera {
        CameraId::Device(index) => {
            options.set("video_size", &format!("{}x{}", request.width, request.height));
            options.set("framerate", &request.fps.to_string());
            ffmpeg_next::device::register_all();
            let path = device_path(*index);
            match ffmpeg_next::device::input::video().find(|f| f.name() == V4L2_FORMAT) {
                Some(format) => {
                    let ctx = ffmpeg_next::format::open_with(
                        &path,
                        &ffmpeg_next::Format::Input(format),
                        options,
                    )?;
                    match ctx {
                        ffmpeg_next::format::context::Context::Input(input) => Ok(input),
                        ffmpeg_next::format::context::Context::Output(_) => {
                            Err(ffmpeg_next::Error::InvalidData)
                        }
                    }
                }
                None => ffmpeg_next::format::input_with_dictionary(&path, options),
            }
        }
        CameraId::Stream(url) => {
            // Microseconds; keeps a dead stream from blocking the loop forever.
            let timeout_us = request.read_timeout.as_micros().to_string();
            options.set("rw_timeout", &timeout_us);
            if url.starts_with("rtsp://") {
                options.set("timeout", &timeout_us);
                options.set("rtsp_transport", "tcp");
            }
            ffmpeg_next::format::input_with_dictionary(url, options)
        }
    }
}

pub fn device_path(index: u32) -> String {
    format!("/dev/video{index}")
}

/// Strips row padding from an RGB24 frame.
fn packed_rgb(rgb: &Video, width: u32, height: u32) -> Vec<u8> {
    let stride = rgb.stride(0);
    let data = rgb.data(0);
    let row_bytes = width as usize * 3;

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        pixels.extend_from_slice(&data[start..start + row_bytes]);
    }
    pixels
}
