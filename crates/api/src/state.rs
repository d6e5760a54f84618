use delay_echo_domain::services::delay::DelayResponder;

#[derive(Clone)]
pub struct AppState {
    responder: DelayResponder,
}

impl AppState {
    pub fn new(responder: DelayResponder) -> Self {
        Self { responder }
    }

    pub fn responder(&self) -> &DelayResponder {
        &self.responder
    }
}
