use std::{
    sync::{Arc, Mutex, mpsc},
    thread::JoinHandle,
    time::{Duration, Instant},
};

use crate::model::{RequestMetadata, SrModel};

// Type alias to simplify complex types
type EngineReceiver<M> = Arc<
    Mutex<
        mpsc::Receiver<
            SrEngineResponse<
                <<M as SrModel>::Request as RequestMetadata>::Metadata,
                <M as SrModel>::Response,
                <M as SrModel>::Error,
            >,
        >,
    >,
>;

/// Represents the current state of the inference engine.
#[derive(Clone, Debug, PartialEq)]
pub enum SrEngineState {
    /// The engine is idle and ready to accept new inference requests.
    Idle,
    /// The engine is currently processing an inference request.
    Processing,
}

impl SrEngineState {
    /// Returns the state as a string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            SrEngineState::Idle => "idle",
            SrEngineState::Processing => "processing",
        }
    }
}

/// Internal request wrapper used by the engine to track inference requests.
pub struct SrEngineRequest<Req> {
    /// Unique identifier for this inference request.
    pub id: u64,
    /// The actual request data to be processed by the model.
    pub request: Req,
}

/// Response returned by the engine containing the model's result and telemetry data.
pub struct SrEngineResponse<Metadata, Res, Err> {
    /// Unique identifier matching the original request.
    pub id: u64,
    /// Timestamp when the inference started.
    pub start_time: Instant,
    /// Total time taken for the inference.
    pub duration: Duration,
    /// Lightweight metadata extracted from the original request.
    pub request_metadata: Metadata,
    /// The outcome of the inference. A failed run is delivered here like any
    /// other result, so the engine keeps accepting requests afterwards.
    pub result: Result<Res, Err>,
}

/// Result type returned when polling for inference results.
pub enum SrEngineResult<M: SrModel + Send + 'static>
where
    M::Request: RequestMetadata,
{
    /// A finished inference with the model's result and telemetry data.
    Done(SrEngineResponse<<M::Request as RequestMetadata>::Metadata, M::Response, M::Error>),
    /// No result available yet, with current engine state.
    Empty(SrEngineState),
    /// The engine itself failed, independent of any single request.
    Error(String),
}

/// Inference engine that manages model execution in a separate thread.
///
/// The engine provides asynchronous inference with built-in telemetry,
/// request tracking, and state management. It decouples callers from the
/// model implementation, allowing for flexible request/response types.
pub struct SrEngine<M: SrModel + Send + 'static>
where
    M::Error: Send + 'static,
    M::Request: Send + RequestMetadata + 'static,
    M::Response: Send + 'static,
{
    state: Arc<Mutex<SrEngineState>>,
    req_tx: Option<mpsc::Sender<SrEngineRequest<M::Request>>>,
    rep_rx: EngineReceiver<M>,
    inference_handle: Option<JoinHandle<()>>,
    id_counter: Arc<Mutex<u64>>,
}

impl<M: SrModel + Send + 'static> SrEngine<M>
where
    M::Error: Send + 'static,
    M::Request: Send + RequestMetadata + 'static,
    M::Response: Send + 'static,
{
    /// Creates a new inference engine with the given model.
    ///
    /// The engine will spawn a background thread to handle inference requests
    /// asynchronously. The model will be moved to this background thread.
    ///
    /// # Arguments
    /// * `model` - The model implementation that will handle inference requests
    ///
    /// # Returns
    /// A new `SrEngine` instance ready to accept inference requests
    pub fn new(mut model: M) -> Self {
        let (req_tx, req_rx) = mpsc::channel::<SrEngineRequest<M::Request>>();
        let (rep_tx, rep_rx) = mpsc::channel::<
            SrEngineResponse<<M::Request as RequestMetadata>::Metadata, M::Response, M::Error>,
        >();
        let state = Arc::new(Mutex::new(SrEngineState::Idle));

        let inference_handle = std::thread::spawn({
            let state = state.clone();
            move || {
                while let Ok(req) = req_rx.recv() {
                    log::debug!("Scheduling a new inference");

                    // Extract lightweight metadata before consuming the request
                    let request_metadata = req.request.metadata();

                    *state.lock().unwrap() = SrEngineState::Processing;
                    let start_time = Instant::now();

                    let result = model.run(req.request);
                    match &result {
                        Ok(_) => log::debug!("Inference completed"),
                        Err(err) => log::error!("Inference failed: {err}"),
                    }

                    let _ = rep_tx.send(SrEngineResponse {
                        id: req.id,
                        start_time,
                        duration: start_time.elapsed(),
                        request_metadata,
                        result,
                    });

                    *state.lock().unwrap() = SrEngineState::Idle;
                }
            }
        });

        Self {
            state,
            req_tx: Some(req_tx),
            rep_rx: Arc::new(Mutex::new(rep_rx)),
            inference_handle: Some(inference_handle),
            id_counter: Arc::new(Mutex::new(0)),
        }
    }

    /// Returns the current state of the inference engine.
    pub fn state(&self) -> SrEngineState {
        self.state.lock().unwrap().clone()
    }

    /// Attempts to retrieve a completed inference result without blocking.
    ///
    /// # Returns
    /// * `Done` - Contains the inference result with telemetry data
    /// * `Empty` - No result available yet, includes current engine state
    /// * `Error` - The engine's worker thread is gone
    pub fn try_poll_response(&self) -> SrEngineResult<M> {
        match self.rep_rx.lock().unwrap().try_recv() {
            Ok(response) => SrEngineResult::Done(response),
            Err(mpsc::TryRecvError::Empty) => SrEngineResult::Empty(self.state()),
            Err(mpsc::TryRecvError::Disconnected) => {
                log::error!("Response channel disconnected");
                SrEngineResult::Error("Response channel disconnected".to_string())
            }
        }
    }

    /// Schedules an inference request for asynchronous processing.
    ///
    /// The request will be queued and processed by the background thread.
    /// Each request is assigned a unique ID for tracking purposes.
    ///
    /// # Arguments
    /// * `request` - The inference request to be processed by the model
    pub fn schedule_inference(&self, request: M::Request) {
        if let Some(tx) = &self.req_tx {
            let mut counter = self.id_counter.lock().unwrap();
            let id = *counter;
            *counter = counter.wrapping_add(1);
            let _ = tx.send(SrEngineRequest { id, request });
        }
    }

    /// Stops the inference engine and shuts down the background thread.
    ///
    /// This method will close the request channel and wait for the background
    /// thread to finish processing any remaining requests.
    pub fn stop(&mut self) {
        self.req_tx.take();
        if let Some(handle) = self.inference_handle.take() {
            let _ = handle.join();
        }
    }
}

impl<M: SrModel + Send + 'static> Drop for SrEngine<M>
where
    M::Error: Send + 'static,
    M::Request: Send + RequestMetadata + 'static,
    M::Response: Send + 'static,
{
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoRequest(String);

    impl RequestMetadata for EchoRequest {
        type Metadata = usize;

        fn metadata(&self) -> usize {
            self.0.len()
        }
    }

    #[derive(Debug, thiserror::Error)]
    #[error("induced failure")]
    struct Boom;

    /// Uppercases its input, failing on the magic word.
    struct EchoModel;

    impl SrModel for EchoModel {
        type Request = EchoRequest;
        type Response = String;
        type Error = Boom;

        fn run(&mut self, request: EchoRequest) -> Result<String, Boom> {
            if request.0 == "boom" {
                Err(Boom)
            } else {
                Ok(request.0.to_uppercase())
            }
        }
    }

    fn wait_done(engine: &SrEngine<EchoModel>) -> SrEngineResponse<usize, String, Boom> {
        for _ in 0..2000 {
            match engine.try_poll_response() {
                SrEngineResult::Done(done) => return done,
                SrEngineResult::Empty(_) => {
                    std::thread::sleep(Duration::from_millis(2));
                }
                SrEngineResult::Error(err) => panic!("engine error: {err}"),
            }
        }
        panic!("timed out waiting for a result");
    }

    #[test]
    fn runs_inference_and_reports_telemetry() {
        let engine = SrEngine::new(EchoModel);
        engine.schedule_inference(EchoRequest("hello".to_string()));

        let done = wait_done(&engine);
        assert_eq!(done.id, 0);
        assert_eq!(done.request_metadata, 5);
        assert_eq!(done.result.unwrap(), "HELLO");
    }

    #[test]
    fn survives_a_failed_inference() {
        let engine = SrEngine::new(EchoModel);

        engine.schedule_inference(EchoRequest("boom".to_string()));
        let failed = wait_done(&engine);
        assert!(failed.result.is_err());

        // The worker is still alive and serves the next request.
        engine.schedule_inference(EchoRequest("again".to_string()));
        let done = wait_done(&engine);
        assert_eq!(done.result.unwrap(), "AGAIN");
    }

    #[test]
    fn request_ids_increment() {
        let engine = SrEngine::new(EchoModel);
        engine.schedule_inference(EchoRequest("a".to_string()));
        engine.schedule_inference(EchoRequest("b".to_string()));

        assert_eq!(wait_done(&engine).id, 0);
        assert_eq!(wait_done(&engine).id, 1);
    }

    #[test]
    fn empty_poll_reports_the_state() {
        let engine = SrEngine::new(EchoModel);
        match engine.try_poll_response() {
            SrEngineResult::Empty(state) => assert_eq!(state, SrEngineState::Idle),
            _ => panic!("expected an empty poll"),
        }
    }

    #[test]
    fn returns_to_idle_after_a_request() {
        let engine = SrEngine::new(EchoModel);
        engine.schedule_inference(EchoRequest("hello".to_string()));
        let _ = wait_done(&engine);

        for _ in 0..2000 {
            if engine.state() == SrEngineState::Idle {
                return;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        panic!("engine never went back to idle");
    }

    #[test]
    fn state_strings_match_the_wire_format() {
        assert_eq!(SrEngineState::Idle.as_str(), "idle");
        assert_eq!(SrEngineState::Processing.as_str(), "processing");
    }
}
