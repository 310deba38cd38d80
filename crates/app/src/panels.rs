//! Sidebar, chat view and input bar.

use eframe::egui;
use shared::records::{Message, Role};

use crate::simple_md::render_markdown;
use crate::types::*;

const CARD_PORTRAIT: f32 = 48.0;
const MESSAGE_PORTRAIT: f32 = 72.0;

fn accent() -> egui::Color32 {
    egui::Color32::from_rgb(176, 79, 208)
}

pub fn header(s: &AppState, ctx: &egui::Context, actions: &mut Vec<UiAction>) {
    let dark = ctx.style().visuals.dark_mode;
    egui::TopBottomPanel::top("header")
        .frame(egui::Frame::none().fill(if dark {
            egui::Color32::from_rgb(35, 30, 42)
        } else {
            egui::Color32::from_rgb(247, 243, 250)
        }))
        .show(ctx, |ui| {
            ui.add_space(10.0);
            ui.horizontal(|ui| {
                ui.add_space(16.0);
                ui.heading(egui::RichText::new("Aphrodisiac").size(22.0).color(accent()));
                if let Some(name) = s.active_personality_name() {
                    ui.add_space(12.0);
                    ui.label(egui::RichText::new(format!("talking with {}", name)).weak());
                }
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    ui.add_space(16.0);
                    if ui.button("Settings").clicked() {
                        actions.push(UiAction::OpenSettings);
                    }
                    if let Some(chat_id) = &s.current_chat {
                        if ui.button("Export").clicked() {
                            actions.push(UiAction::ExportChat(chat_id.clone()));
                        }
                    }
                });
            });
            ui.add_space(10.0);
        });
}

pub fn sidebar(s: &mut AppState, ctx: &egui::Context, actions: &mut Vec<UiAction>) {
    egui::SidePanel::left("sidebar")
        .resizable(false)
        .exact_width(250.0)
        .show(ctx, |ui| {
            ui.add_space(8.0);
            ui.horizontal(|ui| {
                ui.strong("Personalities");
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    if ui.small_button("+").on_hover_text("New personality").clicked() {
                        actions.push(UiAction::NewPersonality);
                    }
                });
            });
            ui.add_space(4.0);

            egui::ScrollArea::vertical()
                .id_source("personalities")
                .max_height(ui.available_height() * 0.5)
                .show(ui, |ui| {
                    let cards: Vec<(String, String)> = s
                        .personalities
                        .iter()
                        .map(|p| (p.id.clone(), p.name.clone()))
                        .collect();
                    if cards.is_empty() {
                        ui.label(egui::RichText::new("Create a personality to start").weak());
                    }
                    for (id, name) in cards {
                        personality_card(s, ui, &id, &name, actions);
                    }
                });

            ui.separator();
            ui.horizontal(|ui| {
                ui.strong("Chats");
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    if ui.small_button("+").on_hover_text("New chat").clicked() {
                        actions.push(UiAction::NewChat);
                    }
                });
            });
            egui::ScrollArea::vertical()
                .id_source("chats")
                .show(ui, |ui| {
                    for chat in &s.chats {
                        let selected = s.current_chat.as_deref() == Some(chat.id.as_str());
                        let pending = s.pending_chats.contains(&chat.id);
                        let label = if pending {
                            format!("{} …", chat.title)
                        } else {
                            chat.title.clone()
                        };
                        let response = ui.selectable_label(selected, label);
                        if response.clicked() {
                            actions.push(UiAction::SelectChat(chat.id.clone()));
                        }
                        response.context_menu(|ui| {
                            if ui.button("Export").clicked() {
                                actions.push(UiAction::ExportChat(chat.id.clone()));
                                ui.close_menu();
                            }
                            if ui.button("Delete").clicked() {
                                actions.push(UiAction::DeleteChat(chat.id.clone()));
                                ui.close_menu();
                            }
                        });
                    }
                });
        });
}

fn personality_card(
    s: &mut AppState,
    ui: &mut egui::Ui,
    id: &str,
    name: &str,
    actions: &mut Vec<UiAction>,
) {
    let active = s.active_personality.as_deref() == Some(id);
    let fill = if active {
        accent().linear_multiply(0.25)
    } else {
        egui::Color32::TRANSPARENT
    };
    let response = egui::Frame::none()
        .fill(fill)
        .rounding(egui::Rounding::same(8.0))
        .inner_margin(egui::Margin::same(6.0))
        .show(ui, |ui| {
            ui.horizontal(|ui| {
                let (rect, _) = ui.allocate_exact_size(
                    egui::vec2(CARD_PORTRAIT, CARD_PORTRAIT),
                    egui::Sense::hover(),
                );
                s.portraits.paint(ui, rect, &card_key(id), Some(id));
                ui.label(egui::RichText::new(name).strong());
            });
        })
        .response
        .interact(egui::Sense::click());

    if response.clicked() && !active {
        actions.push(UiAction::SelectPersonality(id.to_string()));
    }
    response.context_menu(|ui| {
        if ui.button("Edit").clicked() {
            actions.push(UiAction::EditPersonality(id.to_string()));
            ui.close_menu();
        }
        if ui.button("Assets").clicked() {
            actions.push(UiAction::ManageAssets(id.to_string()));
            ui.close_menu();
        }
        if ui.button("Delete").clicked() {
            actions.push(UiAction::DeletePersonality(id.to_string()));
            ui.close_menu();
        }
    });
}

pub fn input_bar(s: &mut AppState, ctx: &egui::Context, actions: &mut Vec<UiAction>) {
    egui::TopBottomPanel::bottom("input")
        .frame(egui::Frame::none().inner_margin(egui::Margin::same(12.0)))
        .show(ctx, |ui| {
            if let Some(status) = &s.status {
                ui.label(egui::RichText::new(status).size(12.0).weak());
                ui.add_space(4.0);
            }
            let pending = s.is_pending();
            ui.horizontal(|ui| {
                let width = ui.available_width() - 80.0;
                let response = ui.add_sized(
                    [width, 32.0],
                    egui::TextEdit::singleline(&mut s.input_text)
                        .hint_text("Say something...")
                        .interactive(!pending),
                );
                let enter = response.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));
                let clicked = ui
                    .add_enabled(!pending, egui::Button::new("Send").min_size(egui::vec2(64.0, 32.0)))
                    .clicked();
                if enter || clicked {
                    actions.push(UiAction::Send);
                    response.request_focus();
                }
            });
        });
}

pub fn chat_view(s: &mut AppState, ctx: &egui::Context, actions: &mut Vec<UiAction>) {
    let dark = ctx.style().visuals.dark_mode;
    egui::CentralPanel::default()
        .frame(
            egui::Frame::none()
                .fill(if dark {
                    egui::Color32::from_rgb(25, 22, 30)
                } else {
                    egui::Color32::from_rgb(252, 250, 253)
                })
                .inner_margin(egui::Margin::same(16.0)),
        )
        .show(ctx, |ui| {
            if s.current_chat.is_none() {
                ui.centered_and_justified(|ui| {
                    ui.label(egui::RichText::new("Start a new chat").size(18.0).weak());
                });
                return;
            }

            let pattern = s.tag_pattern.clone();
            let messages: Vec<Message> = s.messages.clone();
            let last_model = messages
                .iter()
                .rev()
                .find(|m| m.role == Role::Model)
                .map(|m| m.id.clone());
            let scroll = std::mem::take(&mut s.scroll_to_bottom);

            egui::ScrollArea::vertical()
                .auto_shrink([false, false])
                .stick_to_bottom(true)
                .show(ui, |ui| {
                    for msg in &messages {
                        match msg.role {
                            Role::User => user_message(ui, msg),
                            Role::Model => {
                                let is_last = last_model.as_deref() == Some(msg.id.as_str());
                                model_message(s, ui, msg, is_last, dark, &pattern, actions);
                            }
                        }
                        ui.add_space(10.0);
                    }
                    if scroll {
                        ui.scroll_to_cursor(Some(egui::Align::BOTTOM));
                    }
                });
        });
}

fn user_message(ui: &mut egui::Ui, msg: &Message) {
    ui.with_layout(egui::Layout::right_to_left(egui::Align::Min), |ui| {
        ui.add_space(8.0);
        egui::Frame::none()
            .fill(egui::Color32::from_rgb(120, 70, 160))
            .rounding(egui::Rounding::same(12.0))
            .inner_margin(egui::Margin::same(12.0))
            .show(ui, |ui| {
                ui.set_max_width(500.0);
                ui.label(
                    egui::RichText::new(&msg.text)
                        .color(egui::Color32::WHITE)
                        .size(15.0),
                );
            });
    });
}

fn model_message(
    s: &mut AppState,
    ui: &mut egui::Ui,
    msg: &Message,
    is_last: bool,
    dark: bool,
    pattern: &regex::Regex,
    actions: &mut Vec<UiAction>,
) {
    let live = s.live_text.get(&msg.id).cloned();
    let revealing = live.is_some();
    let text = live.unwrap_or_else(|| msg.text.clone());
    let text_color = if dark {
        egui::Color32::from_rgb(225, 220, 232)
    } else {
        egui::Color32::from_rgb(40, 36, 50)
    };

    ui.horizontal_top(|ui| {
        let (rect, _) = ui.allocate_exact_size(
            egui::vec2(MESSAGE_PORTRAIT, MESSAGE_PORTRAIT),
            egui::Sense::hover(),
        );
        s.portraits
            .paint(ui, rect, &msg.id, msg.personality_id.as_deref());

        egui::Frame::none()
            .fill(if dark {
                egui::Color32::from_rgb(48, 42, 56)
            } else {
                egui::Color32::from_rgb(244, 240, 248)
            })
            .rounding(egui::Rounding::same(12.0))
            .inner_margin(egui::Margin::same(12.0))
            .show(ui, |ui| {
                ui.set_max_width(600.0);
                if text.is_empty() {
                    ui.spinner();
                } else {
                    render_markdown(ui, &text, text_color, pattern);
                }

                ui.add_space(6.0);
                ui.horizontal(|ui| {
                    if revealing {
                        if ui.small_button("Stop").clicked() {
                            actions.push(UiAction::Stop(msg.id.clone()));
                        }
                        return;
                    }
                    if ui
                        .small_button("Replay")
                        .on_hover_text("Reveal again, replaying expressions")
                        .clicked()
                    {
                        actions.push(UiAction::Replay(msg.id.clone()));
                    }
                    if is_last && ui.small_button("Regenerate").clicked() {
                        actions.push(UiAction::Regenerate(msg.id.clone()));
                    }
                    if ui.small_button("Copy").clicked() {
                        ui.output_mut(|o| o.copied_text = msg.text.clone());
                    }
                });
            });
    });
}
