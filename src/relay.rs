//! Session collaborator traits implemented on in-process topics.

use anyhow::Result;
use camera_relay::{Subscription, Topic};

use crate::processing::{CameraFrame, ImageRequest};
use crate::session::{
    CameraSink, CameraSource, FrameCallback, RequestCallback, RequestSource, SubscriberCallback,
    UpstreamSubscription,
};

/// Requests are latest-wins; a deeper queue only delays the newest one.
const REQUEST_QUEUE_SIZE: usize = 1;

impl UpstreamSubscription for Subscription {
    fn shutdown(&mut self) {
        Subscription::shutdown(self);
    }
}

impl CameraSource for Topic<CameraFrame> {
    fn name(&self) -> &str {
        Topic::name(self)
    }

    fn subscribe_frames(
        &self,
        queue_size: usize,
        on_frame: FrameCallback,
    ) -> Result<Box<dyn UpstreamSubscription>> {
        let subscription = self.subscribe(queue_size, on_frame)?;
        Ok(Box::new(subscription))
    }
}

impl CameraSink for Topic<CameraFrame> {
    fn name(&self) -> &str {
        Topic::name(self)
    }

    fn publish_frame(&self, frame: CameraFrame) -> Result<()> {
        self.publish(frame);
        Ok(())
    }

    fn subscriber_count(&self) -> usize {
        Topic::subscriber_count(self)
    }

    fn watch_subscribers(&self, on_change: SubscriberCallback) {
        self.on_subscriber_change(on_change);
    }
}

impl RequestSource for Topic<ImageRequest> {
    fn name(&self) -> &str {
        Topic::name(self)
    }

    fn subscribe_requests(&self, on_request: RequestCallback) -> Result<Box<dyn UpstreamSubscription>> {
        let subscription = self.subscribe(REQUEST_QUEUE_SIZE, on_request)?;
        Ok(Box::new(subscription))
    }
}
