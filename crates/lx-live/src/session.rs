//! The live session.
//!
//! Control flow: `run` loads the linked artifact, hands the hosted
//! program a tick callback through its exported `setDLLCallback`, then
//! calls its `main` and stays inside that call until the program exits.
//! Each tick checks one translation unit for changes; a changed unit is
//! recompiled as a shared object, loaded deep-bound, and every mangled
//! symbol it exports is redirected in the host's PLT.
//!
//! Nothing loaded for a patch is ever unloaded mid-session, since the
//! host may still hold function pointers into older images. Handles and
//! temp files are released only at shutdown.

use std::sync::{Arc, OnceLock};
use std::time::SystemTime;

use camino::Utf8PathBuf;
use libc::{c_char, c_int};
use lx_cc::{BuildSettings, SourceKind};
use lx_dl::{DlError, Image, PltTable};
use lx_exec::compile_live;
use lx_graph::{stat_mtime, SourceDb};
use lx_task::Progress;
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum LiveError {
    #[error(transparent)]
    Dl(#[from] DlError),

    #[error("a live session is already active in this process")]
    AlreadyActive,
}

type TickFn = extern "C" fn();
type SetCallbackFn = extern "C" fn(TickFn) -> c_int;
type MainFn = extern "C" fn(c_int, *mut *mut c_char) -> c_int;

struct LiveState {
    db: Arc<SourceDb>,
    settings: Arc<BuildSettings>,
    progress: Progress,
    plt: PltTable,
    /// Patch images, oldest first. Release-on-shutdown only.
    patches: Vec<Image>,
    /// Numbered `tmp<N>.so` files, removed at shutdown.
    temp_files: Vec<Utf8PathBuf>,
    /// Round-robin position over the record arena.
    cursor: usize,
}

/// The tick callback has C linkage and no closure state, so the session
/// lives in a process global. One session per process.
static SESSION: OnceLock<Mutex<Option<LiveState>>> = OnceLock::new();

fn session_slot() -> &'static Mutex<Option<LiveState>> {
    SESSION.get_or_init(|| Mutex::new(None))
}

extern "C" fn tick_trampoline() {
    if let Some(state) = session_slot().lock().as_mut() {
        state.tick();
    }
}

/// Load the final artifact and run the hosted program to completion.
pub fn run(db: Arc<SourceDb>, settings: Arc<BuildSettings>) -> Result<(), LiveError> {
    let host = Image::open_global(&settings.output_file)?;
    let plt = PltTable::from_image(&host)?;

    {
        let mut slot = session_slot().lock();
        if slot.is_some() {
            return Err(LiveError::AlreadyActive);
        }
        *slot = Some(LiveState {
            db,
            settings: settings.clone(),
            progress: Progress::new(),
            plt,
            patches: Vec::new(),
            temp_files: Vec::new(),
            cursor: 0,
        });
    }

    match host.symbol("setDLLCallback") {
        Some(address) => {
            let set_callback: SetCallbackFn = unsafe { std::mem::transmute(address) };
            set_callback(tick_trampoline);
        }
        None => info!("no setDLLCallback() found, so we can't check for file changes"),
    }

    match host.symbol("main") {
        Some(address) => {
            let main_fn: MainFn = unsafe { std::mem::transmute(address) };
            let code = main_fn(0, std::ptr::null_mut());
            debug!(code, "hosted main returned");
        }
        None => info!("no main function found, so we can't start the application"),
    }

    info!("ending live reload session");
    if let Some(state) = session_slot().lock().take() {
        // Close the patch images before deleting their backing files.
        drop(state.patches);
        for path in state.temp_files {
            let _ = std::fs::remove_file(path);
        }
    }
    Ok(())
}

impl LiveState {
    /// One step of the round-robin: advance to the next translation unit
    /// and rebuild it if its source moved past its last compile.
    fn tick(&mut self) {
        let count = self.db.len();
        for _ in 0..count {
            self.cursor = (self.cursor + 1) % count;
            let record = self.db.get(self.cursor);
            if matches!(record.kind, SourceKind::Unit | SourceKind::CUnit) {
                self.check_unit(self.cursor);
                return;
            }
        }
    }

    fn check_unit(&mut self, id: usize) {
        let record = self.db.get(id);
        let Some(source_time) = record.refresh_source_mtime() else {
            return;
        };
        let changed = match *record.artifact_mtime.lock() {
            None => true,
            Some(artifact_time) => source_time > artifact_time,
        };
        if !changed {
            return;
        }

        info!(source = %record.source_path, "changed, recompiling");
        let output = self
            .settings
            .tmp_dir()
            .join(format!("tmp{}.so", self.temp_files.len()));
        self.temp_files.push(output.clone());

        match compile_live(&self.db, &self.settings, &record, &output, &self.progress) {
            Ok(()) => {
                *record.artifact_mtime.lock() = stat_mtime(&output);
                self.load_and_patch(&output);
                info!("done");
            }
            Err(error) => {
                // Pretend the failed attempt produced an artifact so the
                // unit isn't retried until its source changes again.
                warn!(%error, "live rebuild failed");
                *record.artifact_mtime.lock() = Some(SystemTime::now());
            }
        }
    }

    /// Load a freshly built patch image and redirect every Itanium-mangled
    /// symbol it exports.
    fn load_and_patch(&mut self, path: &Utf8PathBuf) {
        let image = match Image::open_deep(path) {
            Ok(image) => image,
            Err(error) => {
                warn!(%error, "loading the patch image failed");
                return;
            }
        };

        let mut redirected = 0usize;
        for name in image.exported_names() {
            if !name.starts_with("_Z") {
                continue;
            }
            let Some(address) = image.symbol(&name) else {
                continue;
            };
            match self.plt.replace(&name, address) {
                Ok(Some(_)) => redirected += 1,
                Ok(None) => {}
                Err(error) => warn!(%error, symbol = %name, "plt rewrite failed"),
            }
        }
        debug!(redirected, image = %path, "patch applied");
        self.patches.push(image);
    }
}
