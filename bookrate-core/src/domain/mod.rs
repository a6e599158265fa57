mod books;
mod moderation;
mod reviews;
mod shelves;
mod social;
mod users;

pub use books::*;
pub use moderation::*;
pub use reviews::*;
pub use shelves::*;
pub use social::*;
pub use users::*;
