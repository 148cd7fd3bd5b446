// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

//! 人类行为模拟
//!
//! 自动化检测器会标记完美线性、完美等时的指针轨迹和零延迟的
//! 键盘输入。这里的辅助函数把每次交互都包上随机化的缓动轨迹、
//! 滚动和输入节奏。轨迹计算是纯函数，随机性只出现在参数采样。

use std::time::Duration;
use tokio::time::sleep;

use crate::automation::driver::{BrowserDriver, DriverError};

/// 二次缓动（ease-in-out）
///
/// t ∈ [0,1]，前半段加速后半段减速
pub fn ease_in_out(t: f64) -> f64 {
    if t < 0.5 {
        2.0 * t * t
    } else {
        1.0 - (-2.0 * t + 2.0).powi(2) / 2.0
    }
}

/// 计算从起点到终点的缓动指针轨迹
///
/// 返回 steps+1 个坐标点，首点为起点，末点为终点
pub fn pointer_path(from: (f64, f64), to: (f64, f64), steps: usize) -> Vec<(f64, f64)> {
    let mut path = Vec::with_capacity(steps + 1);
    for i in 0..=steps {
        let progress = i as f64 / steps as f64;
        let eased = ease_in_out(progress);
        path.push((
            from.0 + (to.0 - from.0) * eased,
            from.1 + (to.1 - from.1) * eased,
        ));
    }
    path
}

/// 给目标坐标加上小幅随机偏移
///
/// 真人从不精确点在元素几何中心
pub fn jittered_target(x: f64, y: f64) -> (f64, f64) {
    (
        x + (rand::random_range(0.0..1.0) - 0.5) * 10.0,
        y + (rand::random_range(0.0..1.0) - 0.5) * 6.0,
    )
}

/// 随机区间休眠
pub async fn pause_between(min_ms: u64, max_ms: u64) {
    sleep(Duration::from_millis(rand::random_range(min_ms..=max_ms))).await;
}

/// 以缓动轨迹把指针移近目标坐标
pub async fn approach_pointer(
    driver: &dyn BrowserDriver,
    x: f64,
    y: f64,
) -> Result<(), DriverError> {
    let start = (
        rand::random_range(0.0..200.0),
        rand::random_range(0.0..200.0),
    );
    let target = jittered_target(x, y);
    let steps = rand::random_range(15..25);

    for (px, py) in pointer_path(start, target, steps) {
        driver.move_pointer(px, py).await?;
        pause_between(5, 20).await;
    }
    Ok(())
}

/// 随机幅度的平滑滚动
pub async fn scroll_page(driver: &dyn BrowserDriver) -> Result<(), DriverError> {
    let amount = rand::random_range(100..350);
    driver
        .evaluate(&format!(
            "window.scrollBy({{ top: {}, behavior: 'smooth' }});",
            amount
        ))
        .await?;
    pause_between(300, 800).await;
    Ok(())
}

/// 在敏感交互前制造看似随意的活动痕迹
///
/// 两次随机指针移动加一次随机滚动
pub async fn idle_activity(driver: &dyn BrowserDriver) -> Result<(), DriverError> {
    for _ in 0..2 {
        let x = rand::random_range(100.0..700.0);
        let y = rand::random_range(100.0..400.0);
        driver.move_pointer(x, y).await?;
        pause_between(300, 800).await;
    }
    driver
        .evaluate(&format!(
            "window.scrollTo({{ top: {}, behavior: 'smooth' }});",
            rand::random_range(0..200)
        ))
        .await?;
    pause_between(500, 1300).await;
    Ok(())
}

/// 以人类击键节奏输入文本
///
/// 每个字符间隔60–180ms，偶尔插入更长的停顿（思考间隙）
pub async fn type_like_human(
    driver: &dyn BrowserDriver,
    selector: &str,
    text: &str,
) -> Result<(), DriverError> {
    for ch in text.chars() {
        driver.type_text(selector, &ch.to_string()).await?;
        pause_between(60, 180).await;
        if rand::random_range(0.0..1.0) > 0.9 {
            pause_between(200, 600).await;
        }
    }
    Ok(())
}
