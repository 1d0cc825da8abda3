mod commander;
mod connect;
mod device;
mod sdk;
mod web_api;

pub use commander::{classify_play_response, PlayHistory, TrackPlaybackCommander};
pub use connect::{ConnectPlayer, ConnectSdk};
pub use device::{ControllerState, DeviceHandle, PlaybackDeviceController, PlayerStateProjection};
pub use sdk::{
    PlaybackSdk, PlayerInstance, PlayerOptions, PlayerState, ReadySdk, SdkEvent, SdkLatch,
    SdkSource, TokenSource,
};
pub use web_api::{
    ConnectDevice, CurrentPlayback, PlaybackApi, ProviderResponse, SpotifyWebApi,
    PREMIUM_REQUIRED_REASON,
};
