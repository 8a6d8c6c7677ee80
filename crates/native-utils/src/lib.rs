pub mod audio;
pub mod capture;
pub mod mixer;

#[cfg(feature = "native-audio")]
pub mod backend;
#[cfg(feature = "native-audio")]
pub mod device;
