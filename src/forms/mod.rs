//! Input flows for the voting screens. Each form owns its own
//! submission state; nothing is shared between forms.

pub mod proposal;
pub mod results;
pub mod session;
pub mod vote;
pub mod voter;

pub use proposal::RegisterProposalForm;
pub use results::ResultView;
pub use session::FormSession;
pub use vote::VoteForm;
pub use voter::RegisterVoterForm;
