/// Downstream consumer of decoded light records.
///
/// The dispatcher calls this once per decoded sync burst or sweep hit, in
/// stream order, on the producer thread. Pose solvers and OOTX decoders hang
/// off this seam.
#[cfg_attr(test, mockall::automock)]
pub trait LightSink {
    fn record(&mut self, object: u32, rec: crate::event::LightRecord);
}
