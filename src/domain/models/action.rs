use super::WardrobeItem;

/// Requests flowing from the display layer to the session coordinator.
#[derive(Debug)]
pub enum Action {
    SubmitPrompt(String),
    SuggestOutfits(Vec<WardrobeItem>),
    AbortReply(),
}
