/**
 * Camera Parts
 *
 * A `FrameSource` produces images; `Camera` runs it on its own thread at
 * the configured framerate and publishes into a latest-value topic. The
 * drive loop copies whatever frame is newest into `cam/image_array`.
 */

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use image::imageops::FilterType;
use image::{Rgb, RgbImage};
use tracing::{debug, info, warn};

use crate::pubsub::{Publisher, Subscriber, Topic};
use crate::vehicle::{Frame, Memory, Part, PartError};

pub trait FrameSource: Send + 'static {
    fn capture(&mut self) -> Result<Frame, PartError>;
}

/// Moving test pattern, for bench runs without a camera attached.
#[derive(Debug, Clone)]
pub struct SyntheticCamera {
    width: u32,
    height: u32,
    tick: u32,
}

impl SyntheticCamera {
    /// `resolution` is (height, width).
    pub fn new(resolution: (u32, u32)) -> Self {
        let (height, width) = resolution;
        Self { width, height, tick: 0 }
    }
}

impl FrameSource for SyntheticCamera {
    fn capture(&mut self) -> Result<Frame, PartError> {
        let tick = self.tick;
        let height = self.height.max(1);
        let image = RgbImage::from_fn(self.width, self.height, |x, y| {
            Rgb([
                ((x + tick) % 256) as u8,
                (y * 255 / height) as u8,
                128,
            ])
        });
        self.tick = self.tick.wrapping_add(1);
        Ok(Frame::new(image))
    }
}

/// Replays image files matched by a glob, looping forever.
#[derive(Debug, Clone)]
pub struct ImageListCamera {
    paths: Vec<PathBuf>,
    next: usize,
    width: u32,
    height: u32,
}

impl ImageListCamera {
    pub fn from_glob(pattern: &str, resolution: (u32, u32)) -> Result<Self, PartError> {
        let entries = glob::glob(pattern)
            .map_err(|e| PartError::device("camera", format!("bad image glob {pattern:?}: {e}")))?;
        let mut paths: Vec<PathBuf> = entries.filter_map(Result::ok).collect();
        paths.sort();
        if paths.is_empty() {
            return Err(PartError::device("camera", format!("no images match {pattern:?}")));
        }
        info!(count = paths.len(), pattern, "image list camera ready");
        let (height, width) = resolution;
        Ok(Self { paths, next: 0, width, height })
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

impl FrameSource for ImageListCamera {
    fn capture(&mut self) -> Result<Frame, PartError> {
        let path = &self.paths[self.next];
        self.next = (self.next + 1) % self.paths.len();
        let image = image::open(path)
            .map_err(|e| PartError::device("camera", format!("{}: {e}", path.display())))?;
        let image = if image.width() == self.width && image.height() == self.height {
            image.to_rgb8()
        } else {
            image.resize_exact(self.width, self.height, FilterType::Triangle).to_rgb8()
        };
        Ok(Frame::new(image))
    }
}

/// Threaded camera part producing `cam/image_array`.
pub struct Camera<S: FrameSource> {
    source: Option<S>,
    publisher: Publisher<Frame>,
    subscriber: Subscriber<Frame>,
    framerate: u32,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    stale_ticks: u64,
}

impl<S: FrameSource> Camera<S> {
    pub fn new(source: S, topic: Arc<Topic<Frame>>, framerate: u32) -> Self {
        Self {
            source: Some(source),
            publisher: Publisher::new(Arc::clone(&topic)),
            subscriber: Subscriber::new(topic),
            framerate: framerate.max(1),
            running: Arc::new(AtomicBool::new(false)),
            handle: None,
            stale_ticks: 0,
        }
    }

    /// Ticks on which no new frame had arrived since the previous tick.
    pub fn stale_ticks(&self) -> u64 {
        self.stale_ticks
    }
}

impl<S: FrameSource> Part for Camera<S> {
    fn name(&self) -> &str {
        "camera"
    }

    fn start(&mut self) -> Result<(), PartError> {
        let Some(mut source) = self.source.take() else {
            return Err(PartError::device("camera", "already started"));
        };

        //first frame synchronously so the loop never starts without an image
        self.publisher.publish(source.capture()?);

        let running = Arc::clone(&self.running);
        running.store(true, Ordering::SeqCst);
        let publisher = self.publisher.clone();
        let period = Duration::from_secs_f64(1.0 / f64::from(self.framerate));

        self.handle = Some(thread::spawn(move || {
            while running.load(Ordering::SeqCst) {
                let started = Instant::now();
                match source.capture() {
                    Ok(frame) => {
                        publisher.publish(frame);
                    }
                    Err(e) => warn!(error = %e, "camera capture failed"),
                }
                if let Some(rest) = period.checked_sub(started.elapsed()) {
                    thread::sleep(rest);
                }
            }
            debug!("camera thread exiting");
        }));
        info!(framerate = self.framerate, "camera started");
        Ok(())
    }

    fn run(&mut self, memory: &mut Memory) -> Result<(), PartError> {
        if !self.subscriber.has_new() {
            self.stale_ticks += 1;
        }
        if let Some(frame) = self.subscriber.take_latest() {
            memory.image = Some(frame);
        }
        Ok(())
    }

    fn shutdown(&mut self) -> Result<(), PartError> {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                return Err(PartError::device("camera", "capture thread panicked"));
            }
        }
        debug!(stale_ticks = self.stale_ticks, "camera stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn synthetic_frames_have_configured_size_and_move() {
        let mut cam = SyntheticCamera::new((120, 160));
        let first = cam.capture().unwrap();
        let second = cam.capture().unwrap();
        assert_eq!((first.width(), first.height()), (160, 120));
        assert_ne!(first.image().get_pixel(0, 0), second.image().get_pixel(0, 0));
    }

    #[test]
    fn image_list_cycles_and_resizes() {
        let dir = tempdir().unwrap();
        for i in 0..2u8 {
            let img = RgbImage::from_pixel(32, 24, Rgb([i * 100, 0, 0]));
            img.save(dir.path().join(format!("{i}.png"))).unwrap();
        }
        let pattern = format!("{}/*.png", dir.path().display());
        let mut cam = ImageListCamera::from_glob(&pattern, (12, 16)).unwrap();
        assert_eq!(cam.len(), 2);

        let a = cam.capture().unwrap();
        let b = cam.capture().unwrap();
        let c = cam.capture().unwrap();
        assert_eq!((a.width(), a.height()), (16, 12));
        assert_eq!(a.image().get_pixel(0, 0)[0], 0);
        assert_eq!(b.image().get_pixel(0, 0)[0], 100);
        assert_eq!(c.image().get_pixel(0, 0)[0], 0);
    }

    #[test]
    fn image_list_without_matches_fails() {
        let dir = tempdir().unwrap();
        let pattern = format!("{}/*.jpg", dir.path().display());
        assert!(ImageListCamera::from_glob(&pattern, (12, 16)).is_err());
    }

    #[test]
    fn threaded_camera_fills_memory() {
        let topic = Arc::new(Topic::new("cam/image_array"));
        let mut camera = Camera::new(SyntheticCamera::new((8, 8)), topic, 100);
        let mut memory = Memory::new();

        camera.start().unwrap();
        camera.run(&mut memory).unwrap();
        camera.shutdown().unwrap();

        let frame = memory.image.expect("frame after start");
        assert_eq!((frame.width(), frame.height()), (8, 8));
        assert!(camera.start().is_err());
    }
}
