//! Players, the event bus that drives them and the set that owns them.
//!
//! ```text
//!   host input ──▶ PlayerSetManager::emit ──▶ EventBus ──▶ Player::handle_event
//!   host UI    ──▶ PlayerSetManager::apply(Intent)
//!                        │ ChangeShader
//!                        ▼
//!                  ShaderLoader (worker) ──▶ pump_fetches ──▶ Player::apply_fetch
//! ```

mod bus;
mod context;
mod cursor;
mod loader;
mod manager;
mod player;

pub use bus::{BusEvent, EventBus, Subscription};
pub use context::AppContext;
pub use cursor::{
    hex_to_rgb_normalized, CursorModel, Direction, CELL_STEP_X, CELL_STEP_Y,
    CURRENT_CURSOR_UNIFORM, CURSOR_CHANGE_TIME_UNIFORM, CURSOR_COLOR_UNIFORM,
    PREVIOUS_CURSOR_UNIFORM,
};
pub use loader::{FetchCompletion, FetchError, FetchTicket, ShaderLoader};
pub use manager::{grid_layout, Intent, ManagerError, PlayerSetManager};
pub use player::{FetchOutcome, Player, PlayerInit, PlayerState, CHANNEL_UNIFORM};
