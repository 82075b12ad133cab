use crux_core::capability::{Capability, CapabilityContext, Operation};
use serde::{Deserialize, Serialize};

use crate::geometry::ImageAspect;
use crate::trip::ImagePayload;

/// A batch of images whose dimensions the shell should read. The shell
/// answers with one aspect per payload, in payload order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasureImages {
    pub payloads: Vec<ImagePayload>,
}

impl Operation for MeasureImages {
    type Output = Vec<ImageAspect>;
}

pub struct Images<E> {
    context: CapabilityContext<MeasureImages, E>,
}

impl<Ev> Capability<Ev> for Images<Ev> {
    type Operation = MeasureImages;
    type MappedSelf<MappedEv> = Images<MappedEv>;

    fn map_event<F, NewEv>(&self, f: F) -> Self::MappedSelf<NewEv>
    where
        F: Fn(NewEv) -> Ev + Send + Sync + 'static,
        Ev: 'static,
        NewEv: 'static + Send,
    {
        Images::new(self.context.map_event(f))
    }
}

impl<E> Images<E>
where
    E: Send + 'static,
{
    pub fn new(context: CapabilityContext<MeasureImages, E>) -> Self {
        Self { context }
    }

    pub fn measure<F>(&self, payloads: Vec<ImagePayload>, callback: F)
    where
        F: FnOnce(Vec<ImageAspect>) -> E + Send + 'static,
    {
        let context = self.context.clone();
        self.context.spawn(async move {
            let aspects = context
                .request_from_shell(MeasureImages { payloads })
                .await;
            context.update_app(callback(aspects));
        });
    }
}
