use std::{sync::Arc, time::Instant};

use crossbeam_channel::{Receiver, Sender};
use gpui::{
    AnyElement, App, AppContext, Bounds, Context, IntoElement, ObjectFit, ParentElement, Render,
    RenderImage, SharedString, Styled, StyledImage, TitlebarOptions, Window, WindowBounds,
    WindowOptions, div, img, px, size,
};
use gpui_component::{
    Root, StyledExt,
    button::{Button, ButtonVariants},
    v_flex,
};
use image::{Frame as ImageFrame, ImageBuffer, Rgba};

use crate::{
    model_download::ModelSource,
    session::{Session, SessionLifecycle},
    types::Frame,
};

mod result_view;
mod scan_view;

// 512px cards with 24px padding and a 16:9 viewfinder.
const CARD_WIDTH: f32 = 512.0;
const CARD_PADDING: f32 = 24.0;
const CARD_INNER_WIDTH: f32 = CARD_WIDTH - CARD_PADDING * 2.0;
const VIDEO_HEIGHT: f32 = CARD_INNER_WIDTH * 9.0 / 16.0;

pub fn launch_ui(
    app: &mut App,
    preview_rx: Receiver<Frame>,
    preview_tx: Sender<Frame>,
    model_source: ModelSource,
) -> gpui::Result<()> {
    let bounds = Bounds::centered(None, size(px(620.0), px(960.0)), app);
    let window_options = WindowOptions {
        window_bounds: Some(WindowBounds::Windowed(bounds)),
        titlebar: Some(TitlebarOptions {
            title: Some("CLASIFICA+".into()),
            appears_transparent: false,
            traffic_light_position: None,
        }),
        ..Default::default()
    };

    app.open_window(window_options, move |window, app| {
        let view = app.new(|_| AppView::new(preview_rx, preview_tx, model_source));
        app.new(|cx| Root::new(view, window, cx))
    })?;

    Ok(())
}

struct AppView {
    screen: Screen,
    session: Session,
    model_source: ModelSource,
    preview_rx: Receiver<Frame>,
    preview_tx: Sender<Frame>,
    latest_frame: Option<Frame>,
    latest_image: Option<Arc<RenderImage>>,
}

#[derive(Clone)]
enum Screen {
    Scan,
    Result { material: String },
}

impl AppView {
    fn new(
        preview_rx: Receiver<Frame>,
        preview_tx: Sender<Frame>,
        model_source: ModelSource,
    ) -> Self {
        let session = Session::start(&model_source, preview_tx.clone());

        Self {
            screen: Screen::Scan,
            session,
            model_source,
            preview_rx,
            preview_tx,
            latest_frame: None,
            latest_image: None,
        }
    }

    /// Tear the finished session down and start over, exactly as if the app
    /// had just been opened.
    fn reset(&mut self, window: &mut Window, cx: &mut Context<'_, Self>) {
        log::info!("starting a fresh scan session");
        self.session.shutdown();
        self.session = Session::start(&self.model_source, self.preview_tx.clone());
        self.screen = Screen::Scan;
        self.latest_frame = None;
        if let Some(old_image) = self.latest_image.take() {
            cx.drop_image(old_image, Some(window));
        }
    }

    fn drain_preview(&mut self, window: &mut Window, cx: &mut Context<'_, Self>) {
        let mut frames = Vec::new();
        while let Ok(frame) = self.preview_rx.try_recv() {
            frames.push(frame);
        }

        if let Some(frame) = frames.pop() {
            if let Some(image) = frame_to_image(&frame) {
                self.replace_latest_image(image, window, cx);
            }
            self.latest_frame = Some(frame);
        }
    }

    fn replace_latest_image(
        &mut self,
        new_image: Arc<RenderImage>,
        window: &mut Window,
        cx: &mut Context<'_, Self>,
    ) {
        if let Some(old_image) = self.latest_image.replace(new_image) {
            // Explicitly drop the previous GPU texture; otherwise the sprite atlas keeps
            // every frame and memory will climb rapidly while the camera is running.
            cx.drop_image(old_image, Some(window));
        }
    }

    fn render_info_card(&self) -> AnyElement {
        v_flex()
            .w(px(CARD_WIDTH))
            .p_6()
            .gap_4()
            .rounded_xl()
            .bg(gpui::rgba(0xffffff1a))
            .border_1()
            .border_color(gpui::rgba(0xffffff33))
            .child(
                div()
                    .w_full()
                    .flex()
                    .justify_center()
                    .text_size(px(30.0))
                    .font_semibold()
                    .text_color(gpui::rgb(0x93c5fd))
                    .child("CLASIFICA+"),
            )
            .child(
                v_flex()
                    .gap_2()
                    .child(div().text_xl().font_semibold().child("Propósito"))
                    .child(
                        div().text_sm().text_color(gpui::rgb(0xd1d5db)).child(
                            "Las empresas necesitan clasificar sus residuos para cumplir con \
                             regulaciones, optimizar sus procesos de reciclaje y reducir su \
                             impacto ambiental.",
                        ),
                    ),
            )
            .child(
                v_flex()
                    .gap_2()
                    .child(div().text_xl().font_semibold().child("¿Cómo funciona?"))
                    .child(
                        v_flex()
                            .gap_1()
                            .text_sm()
                            .text_color(gpui::rgb(0xd1d5db))
                            .child("• Apunta la cámara al material que deseas identificar.")
                            .child("• Mantén el objeto estable por 5 segundos.")
                            .child("• Recibe la clasificación y la información de reciclaje."),
                    ),
            )
            .into_any_element()
    }
}

impl Render for AppView {
    fn render(
        &mut self,
        window: &mut Window,
        cx: &mut Context<'_, Self>,
    ) -> impl gpui::IntoElement {
        // Repaint continuously so camera frames and the confirmation
        // deadline are picked up without user input.
        cx.defer_in(window, |_, _, cx| {
            cx.notify();
        });

        if let Some(material) = self.session.pump(Instant::now()) {
            self.screen = Screen::Result { material };
        }

        let screen = self.screen.clone();
        let content = match screen {
            Screen::Scan => self.render_scan(window, cx),
            Screen::Result { material } => self.render_result(&material, cx),
        };

        v_flex()
            .size_full()
            .items_center()
            .px_4()
            .py_10()
            .gap_8()
            .bg(gpui::rgb(0x111827))
            .text_color(gpui::rgb(0xffffff))
            .child(self.render_info_card())
            .child(content)
    }
}

fn frame_to_image(frame: &Frame) -> Option<Arc<RenderImage>> {
    let mut rgba = frame.rgba.clone();

    // GPUI expects BGRA; convert in place to avoid the async asset pipeline and flicker.
    for px in rgba.chunks_exact_mut(4) {
        px.swap(0, 2);
    }

    let buffer = ImageBuffer::<Rgba<u8>, Vec<u8>>::from_raw(frame.width, frame.height, rgba)?;
    let image_frame = ImageFrame::new(buffer);

    Some(Arc::new(RenderImage::new(vec![image_frame])))
}
