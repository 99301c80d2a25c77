#[cfg(unix)]
mod run;
#[cfg(unix)]
mod support;
