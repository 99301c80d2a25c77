//! A real control listener standing in for `bladerunnerd`.

use std::ffi::OsString;
use std::process::ExitCode;
use std::sync::{Arc, mpsc};
use std::thread::{self, JoinHandle};

use bladerunner_config::{RuntimeConfig, SocketEndpoint};
use bladerunner_control::{
    CONFIG_NAMESPACE, ConfigRouter, ControlListener, ListenerOptions, LocalController,
    NoopObserver, WireFormatKind,
};
use camino::Utf8Path;
use tempfile::TempDir;

/// Serves the control socket in a temporary state directory and releases it
/// once `stop` arrives, as the supervisor does.
pub(crate) struct FakeSupervisor {
    stop: mpsc::Sender<()>,
    closer: Option<JoinHandle<()>>,
}

impl FakeSupervisor {
    pub(crate) fn start(state_dir: &Utf8Path, wire: WireFormatKind, pid: u32) -> Self {
        let options = ListenerOptions {
            wire: wire.format(),
            observer: Arc::new(NoopObserver),
            ..ListenerOptions::default()
        };
        let endpoint = SocketEndpoint::in_state_dir(state_dir);
        let mut listener =
            ControlListener::bind_endpoint(&endpoint, options).expect("bind control listener");

        let (stop, stopped) = mpsc::channel();
        let on_stop = stop.clone();
        listener.register_controller(Arc::new(LocalController::new(move || {
            let _ = on_stop.send(());
        })));
        let config = ConfigRouter::from_config(RuntimeConfig::for_state_dir(state_dir));
        config
            .update(|config| config.pid = Some(pid))
            .expect("publish pid");
        listener.mount(CONFIG_NAMESPACE, config.router(Arc::new(NoopObserver)));
        let handle = listener.start().expect("start control listener");

        let closer = thread::spawn(move || {
            let _ = stopped.recv();
            handle.close().expect("close control listener");
        });
        Self {
            stop,
            closer: Some(closer),
        }
    }
}

impl Drop for FakeSupervisor {
    fn drop(&mut self) {
        let _ = self.stop.send(());
        if let Some(closer) = self.closer.take() {
            let _ = closer.join();
        }
    }
}

pub(crate) fn utf8(dir: &TempDir) -> &Utf8Path {
    Utf8Path::from_path(dir.path()).expect("utf8 temp dir")
}

/// Output of one `br` invocation.
pub(crate) struct Invocation {
    pub(crate) exit: ExitCode,
    pub(crate) stdout: String,
    pub(crate) stderr: String,
}

pub(crate) fn br(state_dir: &Utf8Path, args: &[&str]) -> Invocation {
    let argv = ["br", "--state-dir", state_dir.as_str()]
        .into_iter()
        .chain(args.iter().copied())
        .map(OsString::from);
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let exit = crate::run(argv, &mut stdout, &mut stderr);
    Invocation {
        exit,
        stdout: String::from_utf8(stdout).expect("utf8 stdout"),
        stderr: String::from_utf8(stderr).expect("utf8 stderr"),
    }
}
