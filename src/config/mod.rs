mod settings;

pub use settings::{
    Command, Config, SessionsAction, Settings, StatusSettings, ThemeSettings, WindowSettings,
};
