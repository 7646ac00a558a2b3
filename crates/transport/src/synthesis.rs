/// Sample rate of the raw mono PCM the synthesis service returns.
pub const SYNTH_SAMPLE_RATE: u32 = 16000;

/// Correlates a synthesis request with its response.
///
/// Ids are handed out in issue order and never wrap, so a larger id is always
/// the newer request. The 32-bit id on the wire is the client's business.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub u64);

#[derive(Debug, Clone, PartialEq)]
pub struct SynthResponse {
    pub id: RequestId,
    pub samples: Vec<f32>,
}

/// The remote synthesis collaborator as seen from the control-rate loop.
///
/// Requests are fire-and-forget. Responses are buffered by the implementation
/// and only handed out by [`SynthesisService::poll`], which the control loop
/// calls, so sample and note state is never touched from another thread.
pub trait SynthesisService {
    /// Issue a request for the given latent vector. Returns `None` (after
    /// logging) when the service is not reachable.
    fn request(&mut self, values: &[f32]) -> Option<RequestId>;

    /// Responses that arrived since the last poll, in arrival order.
    fn poll(&mut self) -> Vec<SynthResponse>;

    fn is_alive(&self) -> bool;
}
